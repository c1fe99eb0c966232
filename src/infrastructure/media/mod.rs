//! Media pipelines
//!
//! - inbound: remote track -> OGG recording, with the idle watchdog
//! - outbound: voice agent -> bridge channel -> Opus frames -> local track,
//!   or OGG file playback

pub mod bridge_channel;
pub mod codec;
pub mod outbound;
pub mod playback;
pub mod recorder;
pub mod track;
pub mod watchdog;

pub use bridge_channel::{bridge_channel, BridgeReceiver, BridgeSender, BridgeStats, SendOutcome};
pub use codec::{FrameEncoder, OpusConfig, OpusFrameEncoder};
pub use outbound::{FramePump, OutboundAudio, OutboundLauncher, PumpExit};
pub use playback::{play_ogg_file, PlaybackExit, PlaybackOptions};
pub use recorder::{InboundRecorder, PacketSource, RecordingSink};
pub use track::{LocalSampleTrack, SampleWriter};
pub use watchdog::IdleWatchdog;
