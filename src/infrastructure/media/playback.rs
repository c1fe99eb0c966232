//! Outbound file playback
//!
//! Streams the pages of an OGG/Opus file onto the outbound track, one page
//! per frame duration. The `OpusTags` comment header is not audio and is
//! skipped.

use super::track::SampleWriter;
use crate::domain::call::{CallSession, SessionRegistry, TeardownCause};
use crate::infrastructure::metrics;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use webrtc::media::io::ogg_reader::OggReader;

/// Magic prefix of the Opus comment header page
const OPUS_TAGS: &[u8] = b"OpusTags";

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    pub path: PathBuf,
    /// Nominal duration of each page, also the pacing interval
    pub frame_duration: Duration,
    /// Stop after this long; `None` plays to the end of the file
    pub timeout: Option<Duration>,
    /// Tear the call down when the timeout fires
    pub close_on_timeout: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackExit {
    EndOfFile,
    Cancelled,
    TimedOut,
    /// The file could not be opened or parsed
    Unreadable,
}

/// Play `options.path` onto `writer` until EOF, teardown or timeout
pub async fn play_ogg_file(
    session: Arc<CallSession>,
    registry: Arc<SessionRegistry>,
    writer: Arc<dyn SampleWriter>,
    options: PlaybackOptions,
) -> PlaybackExit {
    let call_id = session.id().clone();

    let contents = match tokio::fs::read(&options.path).await {
        Ok(contents) => contents,
        Err(e) => {
            warn!(call_id = %call_id, path = %options.path.display(), error = %e, "Cannot open playback file");
            return PlaybackExit::Unreadable;
        }
    };

    let mut reader = match OggReader::new(Cursor::new(contents), true) {
        Ok((reader, header)) => {
            debug!(
                call_id = %call_id,
                channels = header.channels,
                sample_rate = header.sample_rate,
                "Playback file opened"
            );
            reader
        }
        Err(e) => {
            warn!(call_id = %call_id, path = %options.path.display(), error = %e, "Invalid OGG file");
            return PlaybackExit::Unreadable;
        }
    };

    let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
    let mut pacer = interval(options.frame_duration);
    pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pages = 0u64;

    let exit = loop {
        tokio::select! {
            biased;
            _ = session.done().closed() => break PlaybackExit::Cancelled,
            _ = sleep_until_deadline(deadline) => break PlaybackExit::TimedOut,
            _ = pacer.tick() => {}
        }

        let page = loop {
            match reader.parse_next_page() {
                Ok((page, _)) if page.starts_with(OPUS_TAGS) => continue,
                Ok((page, _)) => break Some(page.freeze()),
                Err(e) => {
                    // EOF surfaces as a read error as well.
                    debug!(call_id = %call_id, error = %e, "Playback reached end of file");
                    break None;
                }
            }
        };
        let Some(page) = page else {
            break PlaybackExit::EndOfFile;
        };

        match writer.write_sample(page, options.frame_duration).await {
            Ok(()) => {
                pages += 1;
                metrics::record_frame_sent();
            }
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "Failed to write playback page");
                metrics::record_frame_error("write");
            }
        }
    };

    info!(call_id = %call_id, ?exit, pages, "Playback finished");

    if exit == PlaybackExit::TimedOut && options.close_on_timeout {
        registry.teardown(&session, TeardownCause::PlaybackTimeout).await;
    }
    exit
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::transport::MockPeerTransport;
    use crate::infrastructure::media::recorder::RecordingSink;
    use crate::infrastructure::media::track::MockSampleWriter;
    use bytes::Bytes;
    use webrtc::rtp::header::Header;
    use webrtc::rtp::packet::Packet;

    /// Write a small OGG/Opus file with `pages` data pages, page `n` carrying `[0xf8, n]`
    fn write_ogg(dir: &std::path::Path, pages: u16) -> PathBuf {
        let path = dir.join("prompt.ogg");
        let mut sink = RecordingSink::create(&path, 48000, 1).unwrap();
        for seq in 0..pages {
            let packet = Packet {
                header: Header {
                    version: 2,
                    payload_type: 111,
                    sequence_number: seq,
                    timestamp: seq as u32 * 960,
                    ssrc: 1,
                    ..Default::default()
                },
                payload: Bytes::from(vec![0xf8, seq as u8]),
            };
            sink.write(&packet).unwrap();
        }
        sink.close();
        path
    }

    fn session(registry: &SessionRegistry, closes: usize) -> Arc<CallSession> {
        let mut transport = MockPeerTransport::new();
        transport.expect_close().times(closes).returning(|| Ok(()));
        registry.create(Arc::new(transport))
    }

    fn options(path: PathBuf) -> PlaybackOptions {
        PlaybackOptions {
            path,
            frame_duration: Duration::from_millis(5),
            timeout: None,
            close_on_timeout: false,
        }
    }

    #[tokio::test]
    async fn test_plays_every_page_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ogg(dir.path(), 4);
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 0);

        let written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut writer = MockSampleWriter::new();
        {
            let written = written.clone();
            writer.expect_write_sample().returning(move |data, duration| {
                assert_eq!(duration, Duration::from_millis(5));
                written.lock().unwrap().push(data);
                Ok(())
            });
        }

        let exit = play_ogg_file(session, registry.clone(), Arc::new(writer), options(path)).await;
        assert_eq!(exit, PlaybackExit::EndOfFile);
        assert_eq!(registry.len(), 1);

        // No comment header. The writer repeats the last payload on the
        // end-of-stream page.
        let written: Vec<Vec<u8>> = written.lock().unwrap().iter().map(|page| page.to_vec()).collect();
        assert_eq!(
            written,
            vec![
                vec![0xf8, 0],
                vec![0xf8, 1],
                vec![0xf8, 2],
                vec![0xf8, 3],
                vec![0xf8, 3],
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 0);
        let exit = play_ogg_file(
            session,
            registry,
            Arc::new(MockSampleWriter::new()),
            options(PathBuf::from("/nonexistent/prompt.ogg")),
        )
        .await;
        assert_eq!(exit, PlaybackExit::Unreadable);
    }

    #[tokio::test]
    async fn test_timeout_with_close_tears_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ogg(dir.path(), 200);
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 1);

        let mut writer = MockSampleWriter::new();
        writer.expect_write_sample().returning(|_, _| Ok(()));

        let mut opts = options(path);
        opts.timeout = Some(Duration::from_millis(30));
        opts.close_on_timeout = true;

        let exit = play_ogg_file(session.clone(), registry.clone(), Arc::new(writer), opts).await;
        assert_eq!(exit, PlaybackExit::TimedOut);
        assert!(session.done().is_closed());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_without_close_keeps_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ogg(dir.path(), 200);
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 0);

        let mut writer = MockSampleWriter::new();
        writer.expect_write_sample().returning(|_, _| Ok(()));

        let mut opts = options(path);
        opts.timeout = Some(Duration::from_millis(30));

        let exit = play_ogg_file(session.clone(), registry.clone(), Arc::new(writer), opts).await;
        assert_eq!(exit, PlaybackExit::TimedOut);
        assert!(!session.done().is_closed());
    }

    #[tokio::test]
    async fn test_teardown_cancels_playback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ogg(dir.path(), 200);
        let registry = Arc::new(SessionRegistry::new());
        let session = session(&registry, 1);

        let mut writer = MockSampleWriter::new();
        writer.expect_write_sample().returning(|_, _| Ok(()));

        let playback = tokio::spawn(play_ogg_file(
            session.clone(),
            registry.clone(),
            Arc::new(writer),
            options(path),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.teardown(&session, TeardownCause::Hangup).await;

        assert_eq!(playback.await.unwrap(), PlaybackExit::Cancelled);
    }
}
