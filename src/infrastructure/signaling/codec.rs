//! Signal codec
//!
//! Negotiation payloads travel as JSON, gzip-compressed, then standard
//! base64. A request or response body is two such envelopes joined by a
//! single `;`.

use crate::domain::shared::BridgeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use thiserror::Error;

/// Separator between the two envelopes of a body
pub const SEPARATOR: char = ';';

/// Failure to turn an envelope back into a payload
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid gzip stream: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DecodeError> for BridgeError {
    fn from(err: DecodeError) -> Self {
        BridgeError::MalformedRequest(err.to_string())
    }
}

/// Encode a payload into an envelope.
///
/// # Panics
///
/// Panics if the payload cannot be serialized. Every negotiation payload is
/// plain data, so this only happens on a programming error.
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> String {
    let json = serde_json::to_vec(payload).expect("negotiation payload must serialize to JSON");

    let mut gz = GzEncoder::new(Vec::with_capacity(json.len()), Compression::default());
    gz.write_all(&json)
        .expect("writing into an in-memory gzip buffer cannot fail");
    let compressed = gz
        .finish()
        .expect("finishing an in-memory gzip buffer cannot fail");

    STANDARD.encode(compressed)
}

/// Decode an envelope into a payload of type `T`
pub fn decode<T: DeserializeOwned>(envelope: &str) -> Result<T, DecodeError> {
    let compressed = STANDARD.decode(envelope.trim())?;

    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice()).read_to_end(&mut json)?;

    Ok(serde_json::from_slice(&json)?)
}

/// Split a body into its two envelopes. Exactly one separator is accepted.
pub fn split_body(body: &str) -> Result<(&str, &str), BridgeError> {
    let body = body.trim();
    let separators = body.matches(SEPARATOR).count();
    if separators != 1 {
        return Err(BridgeError::MalformedRequest(format!(
            "expected exactly one '{}' separator, found {}",
            SEPARATOR, separators
        )));
    }

    // Count checked above.
    let (first, second) = body.split_once(SEPARATOR).unwrap_or((body, ""));
    Ok((first, second))
}

/// Join two envelopes into a body
pub fn join_envelopes(first: &str, second: &str) -> String {
    format!("{}{}{}", first, SEPARATOR, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
    use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

    const OFFER_SDP: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

    fn candidate(n: u16) -> RTCIceCandidateInit {
        RTCIceCandidateInit {
            candidate: format!("candidate:{} 1 udp 2130706431 192.168.1.{} 5000{} typ host", n, n, n),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn test_candidates_round_trip() {
        let candidates = vec![candidate(1), candidate(2), candidate(3)];
        let decoded: Vec<RTCIceCandidateInit> = decode(&encode(&candidates)).unwrap();
        assert_eq!(decoded, candidates);

        let empty: Vec<RTCIceCandidateInit> = decode(&encode(&Vec::<RTCIceCandidateInit>::new())).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_description_round_trip() {
        let json = serde_json::json!({ "type": "offer", "sdp": OFFER_SDP });
        let envelope = encode(&json);
        let decoded: RTCSessionDescription = decode(&envelope).unwrap();
        assert_eq!(decoded.sdp, OFFER_SDP);
        assert_eq!(decoded.sdp_type.to_string(), "offer");

        let again: serde_json::Value = decode(&encode(&decoded)).unwrap();
        assert_eq!(again, json);
    }

    #[test]
    fn test_envelope_is_text_safe() {
        let envelope = encode(&vec![candidate(9)]);
        assert!(!envelope.contains(SEPARATOR));
        assert!(envelope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err = decode::<Vec<RTCIceCandidateInit>>("not base64!!").unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }

    #[test]
    fn test_decode_rejects_uncompressed_payload() {
        let err = decode::<Vec<RTCIceCandidateInit>>(&STANDARD.encode(b"[]")).unwrap_err();
        assert!(matches!(err, DecodeError::Decompress(_)));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let envelope = encode(&serde_json::json!({ "unexpected": true }));
        let err = decode::<Vec<RTCIceCandidateInit>>(&envelope).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));

        let bridged: BridgeError = err.into();
        assert!(matches!(bridged, BridgeError::MalformedRequest(_)));
    }

    #[test]
    fn test_split_body_requires_single_separator() {
        assert_eq!(split_body("abc;def\n").unwrap(), ("abc", "def"));
        assert_eq!(split_body("abc;").unwrap(), ("abc", ""));
        assert!(split_body("abcdef").is_err());
        assert!(split_body("a;b;c").is_err());
        assert!(split_body("").is_err());
    }

    #[test]
    fn test_join_then_split() {
        let body = join_envelopes("first", "second");
        assert_eq!(body, "first;second");
        assert_eq!(split_body(&body).unwrap(), ("first", "second"));
    }
}
