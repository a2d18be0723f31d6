// crates/genloss-core/src/helpers/mod.rs
//
// Shared helpers with no FFmpeg dependency.

pub mod dsp;
pub mod time;
