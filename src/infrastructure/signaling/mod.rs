//! Signaling envelopes exchanged with the calling client

pub mod codec;

pub use codec::{decode, encode, join_envelopes, split_body, DecodeError, SEPARATOR};
