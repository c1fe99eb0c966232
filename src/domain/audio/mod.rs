//! Audio primitives: PCM conversion and frame assembly

pub mod frame;
pub mod pcm;

pub use frame::{FrameAssembler, FrameSpec};
