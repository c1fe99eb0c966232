//! Audio codec implementations

pub mod opus;

pub use self::opus::{FrameEncoder, OpusApplication, OpusConfig, OpusFrameEncoder};
