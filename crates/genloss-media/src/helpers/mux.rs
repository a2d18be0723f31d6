// crates/genloss-media/src/helpers/mux.rs
//
// Muxer plumbing shared by transcode, degrade and remux.

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::context::Output;

/// Copy an opened encoder's parameters into output stream `stream_index` so
/// the muxer knows resolution, format and codec-private data.
///
/// `Stream::set_parameters` wants `AsPtr<AVCodecParameters>`, which the opened
/// encoders don't implement, so this goes through FFI.
pub fn encoder_params_to_stream(
    octx:         &mut Output,
    stream_index: usize,
    encoder:      *const ffmpeg::ffi::AVCodecContext,
) -> Result<(), String> {
    unsafe {
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(
            (**(*octx.as_mut_ptr()).streams.add(stream_index)).codecpar,
            encoder as *mut ffmpeg::ffi::AVCodecContext,
        );
        if ret < 0 {
            return Err(format!("avcodec_parameters_from_context (stream {stream_index}) failed: {ret}"));
        }
    }
    Ok(())
}

/// Copy input stream parameters onto output stream `stream_index` for a
/// packet-level stream copy. The codec tag is cleared so the output muxer can
/// pick its own.
pub fn copy_stream_params(
    octx:         &mut Output,
    stream_index: usize,
    src:          *const ffmpeg::ffi::AVCodecParameters,
) -> Result<(), String> {
    unsafe {
        let dst = (**(*octx.as_mut_ptr()).streams.add(stream_index)).codecpar;
        let ret = ffmpeg::ffi::avcodec_parameters_copy(dst, src);
        if ret < 0 {
            return Err(format!("avcodec_parameters_copy (stream {stream_index}) failed: {ret}"));
        }
        (*dst).codec_tag = 0;
    }
    Ok(())
}

/// Confirm the muxer actually left a non-empty file behind.
pub fn verify_output(path: &Path) -> Result<u64, String> {
    match std::fs::metadata(path) {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(m.len()),
        Ok(_)  => Err(format!("encoder produced an empty file at '{}'", path.display())),
        Err(e) => Err(format!("encoder produced no file at '{}': {e}", path.display())),
    }
}

/// Items held back until the muxer has reached their timestamp. Used to
/// interleave pre-encoded audio packets with copied video packets.
pub struct TimedQueue<T> {
    items: VecDeque<(f64, T)>,
}

impl<T> TimedQueue<T> {
    pub fn new() -> Self { Self { items: VecDeque::new() } }

    /// Push in non-decreasing time order.
    pub fn push(&mut self, secs: f64, item: T) {
        self.items.push_back((secs, item));
    }

    pub fn len(&self) -> usize { self.items.len() }

    /// Pop every item stamped at or before `until`.
    pub fn pop_due(&mut self, until: f64) -> Vec<T> {
        let mut out = Vec::new();
        while self.items.front().map(|(t, _)| *t <= until).unwrap_or(false) {
            if let Some((_, item)) = self.items.pop_front() {
                out.push(item);
            }
        }
        out
    }

    /// Everything still queued, in order.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.items.drain(..).map(|(_, item)| item).collect()
    }
}
