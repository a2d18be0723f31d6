// crates/genloss-media/src/probe.rs
//
// In-process FFmpeg probing: video dimensions, frame rate, duration.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::context::Input;
use ffmpeg::format::input;
use ffmpeg::format::stream::Stream;
use ffmpeg::media::Type;
use ffmpeg::util::rational::Rational;

use genloss_core::media_types::MediaInfo;

/// Read the first video stream's geometry and rate from `path`.
///
/// Fails when the file can't be opened, has no video stream, or reports a
/// zero size or a frame rate that can't be read.
pub fn probe_media(path: &Path) -> Result<MediaInfo, String> {
    let ictx = input(&path).map_err(|e| format!("open '{}': {e}", path.display()))?;

    let stream = ictx.streams().best(Type::Video)
        .ok_or_else(|| format!("'{}' has no video stream", path.display()))?;

    let (width, height) = unsafe {
        let p = stream.parameters().as_ptr();
        ((*p).width, (*p).height)
    };
    if width <= 0 || height <= 0 {
        return Err(format!("'{}' reports video size {width}x{height}", path.display()));
    }

    let frame_rate = rational_to_fps(stream.avg_frame_rate())
        .or_else(|| rational_to_fps(stream.rate()))
        .ok_or_else(|| format!("'{}' has no readable frame rate", path.display()))?;

    let duration_secs = duration_secs(&ictx, &stream);

    let info = MediaInfo {
        width:  width as u32,
        height: height as u32,
        frame_rate,
        duration_secs,
    };
    log::debug!("[probe] {info} ← {}", path.display());
    Ok(info)
}

/// Container duration, falling back to `stream`'s own when the container
/// doesn't report one. 0.0 when neither is known.
pub fn duration_secs(ictx: &Input, stream: &Stream) -> f64 {
    let container_dur = ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
    if container_dur > 0.0 {
        return container_dur;
    }
    let tb = stream.time_base();
    let d  = stream.duration() as f64 * tb.numerator() as f64
        / tb.denominator().max(1) as f64;
    d.max(0.0)
}

/// Length of `stream` itself, falling back to the container duration when
/// the stream doesn't report one. Use this instead of `duration_secs` when
/// other tracks in the file may run longer. 0.0 when neither is known.
pub fn stream_duration_secs(ictx: &Input, stream: &Stream) -> f64 {
    let d = stream.duration();
    if d > 0 {
        return d as f64 * f64::from(stream.time_base());
    }
    duration_secs(ictx, stream)
}

/// Integer frames per second from an FFmpeg rational, rounded to nearest.
/// `None` for 0/0, negative, or sub-0.5 rates.
pub fn rational_to_fps(r: Rational) -> Option<u32> {
    let (num, den) = (r.numerator(), r.denominator());
    if num <= 0 || den <= 0 {
        return None;
    }
    let fps = (num as f64 / den as f64).round();
    if fps < 1.0 { None } else { Some(fps as u32) }
}
