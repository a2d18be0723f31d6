// crates/genloss-media/src/transcode.rs
//
// One generation: re-encode a file at a target resolution and frame rate.
//
// Stream layout in the output MP4:
//   Stream 0: H.264 video (YUV420P, CRF/preset from TranscodePolicy)
//   Stream 1: AAC audio  (FLTP stereo, policy rate and bitrate)
//
// PTS strategy:
//   Video: output slot index from `FrameSlots`, in 1/fps. The slot scheduler
//   drops or repeats decoded frames to hit the target rate.
//   Audio: sample counter inside `AudioStreamEncoder`, in 1/rate.
//
// The audio track is cut or padded with silence to the length of the video
// written, so a generation never outlasts its picture. A source with no audio
// track gets a silent one, so every generation file carries audio for the
// degrade step to read. Audio is held back until the video catches up, which
// keeps surplus source audio out of the encoder.
//
// Cancellation: `cancel` is checked after every demuxed packet.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::{Pixel, Sample, input as open_input, output as open_output};
use ffmpeg::format::context::Output;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::scaling::{Context as ScaleCtx, Flags as ScaleFlags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use genloss_core::config::TranscodePolicy;
use genloss_core::helpers::time::secs_to_samples;
use genloss_core::ladder::ResolutionRung;
use genloss_core::state::TargetRungs;

use crate::error::StepError;
use crate::helpers::audio_enc::{AudioEncoderSpec, AudioStreamEncoder};
use crate::helpers::mux::{encoder_params_to_stream, verify_output};
use crate::helpers::pcm::{LazyResampler, PcmLayout};
use crate::helpers::slots::FrameSlots;

pub const CANCELLED: &str = "cancelled";

/// Re-encode `src` into `dst` at `target`. Blocking.
///
/// Returns the rung actually written. Both dimensions must be even (YUV420P);
/// ladders are checked for that when the config is built.
pub fn transcode_generation(
    src:    &Path,
    dst:    &Path,
    target: TargetRungs,
    policy: &TranscodePolicy,
    cancel: &AtomicBool,
) -> Result<TargetRungs, StepError> {
    let ResolutionRung { width, height } = target.resolution;
    if !target.resolution.is_yuv420_compatible() {
        return Err(format!("cannot encode {width}x{height}: YUV420P needs even dimensions").into());
    }
    let fps = target.frame_rate.max(1);

    // ── Input ─────────────────────────────────────────────────────────────────
    let mut ictx = open_input(&src)
        .map_err(|e| format!("open '{}': {e}", src.display()))?;

    let video_stream_idx = ictx.streams().best(MediaType::Video)
        .ok_or_else(|| format!("no video stream in '{}'", src.display()))?
        .index();
    let audio_stream_idx: Option<usize> = ictx.streams().best(MediaType::Audio).map(|s| s.index());

    let (in_video_tb, src_display_w, src_display_h, mut video_decoder) = {
        let stream = ictx.stream(video_stream_idx)
            .ok_or_else(|| "video stream vanished".to_string())?;
        let ctx = codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| format!("video decoder context: {e}"))?;
        let dec = ctx.decoder().video()
            .map_err(|e| format!("open video decoder: {e}"))?;
        let params = stream.parameters();
        let (w, h) = (params.width() as u32, params.height() as u32);
        // Container dims exclude macroblock padding; fall back to the decoder's.
        let (w, h) = if w > 0 && h > 0 { (w, h) } else { (dec.width(), dec.height()) };
        (stream.time_base(), w, h, dec)
    };

    let (in_audio_tb, mut audio_decoder) = match audio_stream_idx.and_then(|i| ictx.stream(i)) {
        Some(ast) => {
            // Soft-fail: an undecodable audio stream becomes silence.
            let dec = codec::context::Context::from_parameters(ast.parameters())
                .and_then(|ctx| ctx.decoder().audio());
            match dec {
                Ok(d)  => (ast.time_base(), Some(d)),
                Err(e) => {
                    log::warn!("[transcode] audio decoder unavailable for '{}': {e}", src.display());
                    (ast.time_base(), None)
                }
            }
        }
        None => (Rational::new(1, 1), None),
    };

    // ── Output ────────────────────────────────────────────────────────────────
    let mut octx = open_output(&dst)
        .map_err(|e| format!("could not open output '{}': {e}", dst.display()))?;

    let frame_tb = Rational::new(1, fps as i32);
    let mut video_encoder = add_video_encoder(&mut octx, width, height, fps, policy)?;

    let mut audio = AudioStreamEncoder::add_to(&mut octx, 1, AudioEncoderSpec {
        codec:    CodecId::AAC,
        rate:     policy.audio_rate,
        channels: 2,
        bit_rate: policy.audio_bitrate,
    })?;

    octx.write_header()
        .map_err(|e| format!("write output header: {e}"))?;
    audio.bind_output(&octx);
    let ost_tb = octx.stream(0)
        .ok_or_else(|| "output video stream vanished".to_string())?
        .time_base();

    // ── Packet loop ───────────────────────────────────────────────────────────
    let mut video = VideoSink {
        encoder: &mut video_encoder,
        scaler:  None,
        slots:   FrameSlots::new(fps),
        src_w:   src_display_w,
        src_h:   src_display_h,
        dst_w:   width,
        dst_h:   height,
        in_tb:   in_video_tb,
        frame_tb,
        ost_tb,
    };
    let mut resampler = LazyResampler::new(
        Sample::F32(SampleType::Planar), PcmLayout::Stereo, policy.audio_rate,
    );

    for result in ictx.packets() {
        let (stream, packet) = result
            .map_err(|e| format!("read packet from '{}': {e}", src.display()))?;

        if cancel.load(Ordering::Relaxed) {
            return Err(CANCELLED.into());
        }

        let sidx = stream.index();
        if sidx == video_stream_idx {
            video_decoder.send_packet(&packet)
                .map_err(|e| format!("send video packet to decoder: {e}"))?;
            let mut decoded = VideoFrame::empty();
            while video_decoder.receive_frame(&mut decoded).is_ok() {
                video.push(&decoded, &mut octx)?;
            }
        } else if Some(sidx) == audio_stream_idx {
            let Some(adec) = audio_decoder.as_mut() else { continue };
            // Soft-fail: a bad audio packet should not abort the generation.
            if adec.send_packet(&packet).is_err() { continue; }
            let mut raw = AudioFrame::empty();
            while adec.receive_frame(&mut raw).is_ok() {
                let pts_secs = raw.pts()
                    .map(|pts| pts as f64 * f64::from(in_audio_tb))
                    .unwrap_or(0.0);
                if pts_secs < -0.05 { continue; }
                if let Some(out) = resampler.run(&raw)? {
                    audio.fifo.push_frame(&out);
                }
                let limit = samples_at(video.slots.emitted(), fps, policy.audio_rate);
                audio.drain_until(limit, &mut |pkt: Packet| write_packet(pkt, &mut octx))?;
            }
        }
    }

    // ── Drain decoders ────────────────────────────────────────────────────────
    // Some codecs (e.g. H.264 with B-frames) hold frames internally; flush them.
    let _ = video_decoder.send_eof();
    let mut decoded = VideoFrame::empty();
    while video_decoder.receive_frame(&mut decoded).is_ok() {
        video.push(&decoded, &mut octx)?;
    }

    if let Some(adec) = audio_decoder.as_mut() {
        let _ = adec.send_eof();
        let mut raw = AudioFrame::empty();
        while adec.receive_frame(&mut raw).is_ok() {
            if let Some(out) = resampler.run(&raw)? {
                audio.fifo.push_frame(&out);
            }
        }
    }

    let frames = video.slots.emitted();
    if frames == 0 {
        return Err(format!("no video frames decoded from '{}'", src.display()).into());
    }

    // ── Fit audio to the video ────────────────────────────────────────────────
    let want = samples_at(frames, fps, policy.audio_rate).max(0) as usize;
    let have = audio.samples_encoded() as usize + audio.fifo.len();
    if have != want {
        log::debug!("[transcode] audio {have} → {want} samples to match {frames} video frames");
    }
    audio.fit_total(want);

    // ── Flush encoders ────────────────────────────────────────────────────────
    video.encoder.send_eof()
        .map_err(|e| format!("send EOF to video encoder: {e}"))?;
    drain_video_packets(video.encoder, &mut octx, frame_tb, ost_tb)?;

    audio.finish(&mut |pkt: Packet| write_packet(pkt, &mut octx))?;

    octx.write_trailer()
        .map_err(|e| format!("write trailer: {e}"))?;

    let bytes = verify_output(dst)?;
    log::debug!(
        "[transcode] {}x{}@{}: {frames} frames, {bytes} bytes → {}",
        width, height, fps, dst.display(),
    );

    Ok(TargetRungs {
        resolution: ResolutionRung { width, height },
        frame_rate: fps,
    })
}

// ── Video side ────────────────────────────────────────────────────────────────

pub(crate) fn add_video_encoder(
    octx:   &mut Output,
    width:  u32,
    height: u32,
    fps:    u32,
    policy: &TranscodePolicy,
) -> Result<ffmpeg::encoder::video::Video, StepError> {
    let out_tb = Rational::new(1, fps as i32);

    let h264 = encoder::find(CodecId::H264)
        .ok_or_else(|| StepError::Unavailable("H.264 encoder not found; is libx264 available?".into()))?;

    let mut ost_video = octx.add_stream(h264)
        .map_err(|e| format!("add video stream: {e}"))?;
    ost_video.set_time_base(out_tb);

    let video_enc_ctx = codec::context::Context::new_with_codec(h264);
    let mut video_enc = video_enc_ctx.encoder().video()
        .map_err(|e| format!("create video encoder context: {e}"))?;

    video_enc.set_width(width);
    video_enc.set_height(height);
    video_enc.set_format(Pixel::YUV420P);
    video_enc.set_time_base(out_tb);
    video_enc.set_frame_rate(Some(Rational::new(fps as i32, 1)));
    video_enc.set_bit_rate(0); // CRF controls quality

    let mut opts = ffmpeg::Dictionary::new();
    opts.set("crf",    &policy.crf.to_string());
    opts.set("preset", &policy.preset);

    let mut video_encoder = video_enc.open_as_with(h264, opts)
        .map_err(|e| format!("open H.264 encoder: {e}"))?;

    // libavcodec resets the SAR during open; set it on the opened context.
    video_encoder.set_aspect_ratio(Rational::new(1, 1));

    encoder_params_to_stream(
        octx,
        0,
        video_encoder.as_ptr() as *const ffmpeg::ffi::AVCodecContext,
    )?;
    Ok(video_encoder)
}

/// Scales decoded frames and feeds them to the encoder at their output slots.
struct VideoSink<'a> {
    encoder:  &'a mut ffmpeg::encoder::video::Video,
    scaler:   Option<ScaleCtx>,
    slots:    FrameSlots,
    src_w:    u32,
    src_h:    u32,
    dst_w:    u32,
    dst_h:    u32,
    in_tb:    Rational,
    frame_tb: Rational,
    ost_tb:   Rational,
}

impl VideoSink<'_> {
    fn push(&mut self, decoded: &VideoFrame, octx: &mut Output) -> Result<(), String> {
        let pts_secs = decoded.pts()
            .map(|pts| pts as f64 * f64::from(self.in_tb))
            .unwrap_or(self.slots.emitted() as f64 * f64::from(self.frame_tb));

        let slots = self.slots.take(pts_secs);
        if slots.is_empty() { return Ok(()); }

        if self.scaler.is_none() {
            // Use the container's display dimensions, not decoded.width/height,
            // so macroblock padding rows don't end up in the picture.
            let sc = ScaleCtx::get(
                decoded.format(), self.src_w, self.src_h,
                Pixel::YUV420P,   self.dst_w, self.dst_h,
                ScaleFlags::BILINEAR,
            ).map_err(|e| format!("create swscale context: {e}"))?;
            self.scaler = Some(sc);
        }
        let Some(sc) = self.scaler.as_mut() else { return Ok(()) };

        let mut yuv = VideoFrame::empty();
        sc.run(decoded, &mut yuv)
            .map_err(|e| format!("scale video frame: {e}"))?;
        // swscale inherits the source SAR; force square pixels.
        unsafe {
            (*yuv.as_mut_ptr()).sample_aspect_ratio =
                ffmpeg::ffi::AVRational { num: 1, den: 1 };
        }

        for slot in slots {
            yuv.set_pts(Some(slot));
            self.encoder.send_frame(&yuv)
                .map_err(|e| format!("send video frame to encoder: {e}"))?;
            drain_video_packets(self.encoder, octx, self.frame_tb, self.ost_tb)?;
        }
        Ok(())
    }
}

pub(crate) fn drain_video_packets(
    encoder:  &mut ffmpeg::encoder::video::Video,
    octx:     &mut Output,
    frame_tb: Rational,
    ost_tb:   Rational,
) -> Result<(), String> {
    let mut pkt = Packet::empty();
    while encoder.receive_packet(&mut pkt).is_ok() {
        pkt.set_stream(0);
        pkt.rescale_ts(frame_tb, ost_tb);
        pkt.write_interleaved(octx)
            .map_err(|e| format!("write video packet: {e}"))?;
    }
    Ok(())
}

/// Audio samples per channel that span `frames` video frames at `fps`.
fn samples_at(frames: i64, fps: u32, rate: u32) -> i64 {
    secs_to_samples(frames as f64 / fps.max(1) as f64, rate) as i64
}

pub(crate) fn write_packet(pkt: Packet, octx: &mut Output) -> Result<(), String> {
    pkt.write_interleaved(octx)
        .map_err(|e| format!("write audio packet: {e}"))
}
