// crates/genloss-media/src/helpers/mod.rs
//
// Internal helper modules for genloss-media.
// Not re-exported from lib.rs; these are transcode/degrade/remux
// implementation details, not part of the backend API.

pub mod audio_enc;
pub mod mux;
pub mod pcm;
pub mod slots;

#[cfg(test)]
pub mod test_clip;
