// crates/genloss-media/src/helpers/test_clip.rs
//
// Small synthetic clips for the media tests, encoded in-process with the
// crate's own encoders so the tests need no fixture files.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::Id as CodecId;
use ffmpeg::format::{input as open_input, output as open_output, Pixel};
use ffmpeg::media::Type as MediaType;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use genloss_core::config::TranscodePolicy;
use genloss_core::helpers::time::secs_to_samples;
use genloss_core::MediaBackend;

use crate::backend::FfmpegBackend;
use crate::error::StepError;
use crate::helpers::audio_enc::{AudioEncoderSpec, AudioStreamEncoder};
use crate::probe::stream_duration_secs;
use crate::transcode::{add_video_encoder, drain_video_packets, write_packet};

pub struct ClipSpec {
    pub width:      u32,
    pub height:     u32,
    pub fps:        u32,
    pub video_secs: f64,
    /// `None` writes a video-only file.
    pub audio_secs: Option<f64>,
}

impl ClipSpec {
    /// 64x64 @ 25 fps with a matching audio track.
    pub fn small(video_secs: f64) -> Self {
        Self { width: 64, height: 64, fps: 25, video_secs, audio_secs: Some(video_secs) }
    }
}

/// True when FFmpeg is linked with every encoder the backend needs. Tests
/// that touch real media return early otherwise.
pub fn ffmpeg_ready() -> bool {
    match FfmpegBackend::new().and_then(|b| b.ensure_available()) {
        Ok(_)  => true,
        Err(e) => {
            eprintln!("skipping media test: {e}");
            false
        }
    }
}

/// Write an H.264 (+ AAC sine) MP4 described by `spec` to `path`.
pub fn write_clip(path: &Path, spec: &ClipSpec) -> Result<(), StepError> {
    let policy = TranscodePolicy::default();
    let mut octx = open_output(&path)
        .map_err(|e| format!("could not open output '{}': {e}", path.display()))?;

    let mut video = add_video_encoder(&mut octx, spec.width, spec.height, spec.fps, &policy)?;
    let mut audio = match spec.audio_secs {
        Some(_) => Some(AudioStreamEncoder::add_to(&mut octx, 1, AudioEncoderSpec {
            codec:    CodecId::AAC,
            rate:     policy.audio_rate,
            channels: 2,
            bit_rate: policy.audio_bitrate,
        })?),
        None => None,
    };

    octx.write_header()
        .map_err(|e| format!("write output header: {e}"))?;
    if let Some(a) = audio.as_mut() {
        a.bind_output(&octx);
    }
    let ost_tb = octx.stream(0)
        .ok_or_else(|| "output video stream vanished".to_string())?
        .time_base();
    let frame_tb = Rational::new(1, spec.fps as i32);

    let frames = (spec.video_secs * spec.fps as f64).round() as i64;
    let mut frame = VideoFrame::new(Pixel::YUV420P, spec.width, spec.height);
    for i in 0..frames {
        // Moving luma ramp over flat grey chroma.
        let stride = frame.stride(0);
        for (offset, px) in frame.data_mut(0).iter_mut().enumerate() {
            *px = ((offset % stride) as i64 * 4 + i * 8) as u8;
        }
        frame.data_mut(1).fill(128);
        frame.data_mut(2).fill(128);
        frame.set_pts(Some(i));
        video.send_frame(&frame)
            .map_err(|e| format!("send video frame to encoder: {e}"))?;
        drain_video_packets(&mut video, &mut octx, frame_tb, ost_tb)?;
    }
    video.send_eof()
        .map_err(|e| format!("send EOF to video encoder: {e}"))?;
    drain_video_packets(&mut video, &mut octx, frame_tb, ost_tb)?;

    if let (Some(a), Some(secs)) = (audio.as_mut(), spec.audio_secs) {
        let n = secs_to_samples(secs, policy.audio_rate);
        let step = 440.0 * std::f32::consts::TAU / policy.audio_rate as f32;
        let tone: Vec<f32> = (0..n)
            .flat_map(|i| {
                let s = 0.25 * (i as f32 * step).sin();
                [s, s]
            })
            .collect();
        a.fifo.push_interleaved(&tone);
        a.finish(&mut |pkt: Packet| write_packet(pkt, &mut octx))?;
    }

    octx.write_trailer()
        .map_err(|e| format!("write trailer: {e}"))?;
    Ok(())
}

/// Per-stream durations of `path` in seconds: (video, audio). Audio is
/// `None` when the file has no audio track.
pub fn track_durations(path: &Path) -> (f64, Option<f64>) {
    let ictx = open_input(&path).unwrap();
    let video = ictx.streams().best(MediaType::Video)
        .map(|s| stream_duration_secs(&ictx, &s))
        .unwrap_or(0.0);
    let audio = ictx.streams().best(MediaType::Audio)
        .map(|s| stream_duration_secs(&ictx, &s));
    (video, audio)
}
