// crates/genloss-media/src/remux.rs
//
// Merge a generation's video with its degraded audio.
//
// Stream layout in the output MP4:
//   Stream 0: the generation's video, packet-copied (no re-encode)
//   Stream 1: AAC, the video's own audio with the degraded audio mixed on top
//
// The audio bed is the video's own track resampled to stereo at the policy
// rate, cut or padded with silence to the video stream's duration (not the
// container's, which covers the longest track), so the merged file never runs
// longer than its picture. The degraded audio is mixed in
// from the start and truncated to the bed; a shorter overlay just ends early.
//
// All audio is encoded up front into a `TimedQueue`, then released between
// copied video packets so the muxer sees both streams in time order.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::Id as CodecId;
use ffmpeg::encoder;
use ffmpeg::format::{input as open_input, output as open_output};
use ffmpeg::media::Type as MediaType;
use ffmpeg::Packet;

use genloss_core::config::TranscodePolicy;
use genloss_core::helpers::dsp::overlay;
use genloss_core::helpers::time::secs_to_samples;
use genloss_core::scratch::remove_file_logged;

use crate::error::StepError;
use crate::helpers::audio_enc::{AudioEncoderSpec, AudioStreamEncoder};
use crate::helpers::mux::{copy_stream_params, verify_output, TimedQueue};
use crate::helpers::pcm::{decode_audio, PcmLayout};
use crate::probe::stream_duration_secs;

const CHANNELS: usize = 2;

/// Write `video` + (`video`'s audio overlaid with `audio`) to `dst`, then
/// delete `audio`. Blocking.
pub fn remux(video: &Path, audio: &Path, dst: &Path, policy: &TranscodePolicy) -> Result<(), StepError> {
    let mut ictx = open_input(&video)
        .map_err(|e| format!("open '{}': {e}", video.display()))?;

    let (video_stream_idx, in_tb, video_secs) = {
        let stream = ictx.streams().best(MediaType::Video)
            .ok_or_else(|| format!("no video stream in '{}'", video.display()))?;
        (stream.index(), stream.time_base(), stream_duration_secs(&ictx, &stream))
    };

    // ── Audio bed + overlay ───────────────────────────────────────────────────
    let rate = policy.audio_rate;
    let bed_len = secs_to_samples(video_secs, rate) * CHANNELS;
    let mut bed = decode_audio(video, rate, PcmLayout::Stereo)?.unwrap_or_default();
    // Unknown duration: keep whatever the video's own track decoded to.
    if bed_len > 0 {
        bed.resize(bed_len, 0.0);
    }

    let degraded = decode_audio(audio, rate, PcmLayout::Stereo)?
        .ok_or_else(|| format!("'{}' has no audio track", audio.display()))?;
    let mixed = overlay(&mut bed, &degraded);
    if mixed < degraded.len() {
        log::debug!(
            "[remux] degraded audio truncated to bed: {} of {} samples used",
            mixed, degraded.len(),
        );
    }

    // ── Output ────────────────────────────────────────────────────────────────
    let mut octx = open_output(&dst)
        .map_err(|e| format!("could not open output '{}': {e}", dst.display()))?;

    {
        let copy = encoder::find(CodecId::None);
        let mut ost = octx.add_stream(copy)
            .map_err(|e| format!("add video stream: {e}"))?;
        ost.set_time_base(in_tb);
    }
    {
        let stream = ictx.stream(video_stream_idx)
            .ok_or_else(|| "video stream vanished".to_string())?;
        copy_stream_params(&mut octx, 0, stream.parameters().as_ptr())?;
    }

    let mut aac = AudioStreamEncoder::add_to(&mut octx, 1, AudioEncoderSpec {
        codec:    CodecId::AAC,
        rate,
        channels: CHANNELS,
        bit_rate: policy.audio_bitrate,
    })?;

    octx.write_header()
        .map_err(|e| format!("write output header: {e}"))?;
    aac.bind_output(&octx);

    let ost_video_tb = octx.stream(0)
        .ok_or_else(|| "output video stream vanished".to_string())?
        .time_base();
    let ost_audio_tb = octx.stream(1)
        .ok_or_else(|| "output audio stream vanished".to_string())?
        .time_base();

    // ── Pre-encode audio ──────────────────────────────────────────────────────
    let mut queue: TimedQueue<Packet> = TimedQueue::new();
    aac.fifo.push_interleaved(&bed);
    aac.finish(&mut |pkt: Packet| {
        let secs = pkt.pts().unwrap_or(0) as f64 * f64::from(ost_audio_tb);
        queue.push(secs, pkt);
        Ok(())
    })?;
    let audio_packets = queue.len();

    // ── Copy video, interleaving audio ────────────────────────────────────────
    let mut video_packets = 0usize;
    for result in ictx.packets() {
        let (stream, mut packet) = result
            .map_err(|e| format!("read packet from '{}': {e}", video.display()))?;
        if stream.index() != video_stream_idx { continue; }

        let secs = packet.dts().or(packet.pts()).unwrap_or(0) as f64 * f64::from(in_tb);
        for pkt in queue.pop_due(secs) {
            pkt.write_interleaved(&mut octx)
                .map_err(|e| format!("write audio packet: {e}"))?;
        }

        packet.set_stream(0);
        packet.rescale_ts(in_tb, ost_video_tb);
        packet.set_position(-1);
        packet.write_interleaved(&mut octx)
            .map_err(|e| format!("write video packet: {e}"))?;
        video_packets += 1;
    }

    for pkt in queue.drain_all() {
        pkt.write_interleaved(&mut octx)
            .map_err(|e| format!("write audio packet: {e}"))?;
    }

    octx.write_trailer()
        .map_err(|e| format!("write trailer: {e}"))?;
    verify_output(dst)?;

    log::debug!(
        "[remux] {video_packets} video + {audio_packets} audio packets → {}",
        dst.display(),
    );

    remove_file_logged(audio);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use genloss_core::config::AudioPolicy;

    use crate::degrade::write_mp3;
    use crate::helpers::test_clip::{ffmpeg_ready, track_durations, write_clip, ClipSpec};

    const TOLERANCE_SECS: f64 = 0.1;

    /// Mono tone of `secs` at the degrade step's rate, written as MP3.
    fn tone_mp3(path: &Path, secs: f64) {
        let policy = AudioPolicy::default();
        let n = secs_to_samples(secs, policy.sample_rate);
        let samples: Vec<f32> = (0..n).map(|i| 0.2 * (i as f32 * 0.05).sin()).collect();
        write_mp3(path, &samples, &policy).unwrap();
    }

    #[test]
    fn longer_overlay_never_outlasts_the_video() {
        if !ffmpeg_ready() { return; }
        let tmp = tempfile::tempdir().unwrap();
        let video = tmp.path().join("gen1.mp4");
        let mp3 = tmp.path().join("gen1.mp3");
        let dst = tmp.path().join("merged.mp4");
        write_clip(&video, &ClipSpec::small(1.0)).unwrap();
        tone_mp3(&mp3, 3.0);

        remux(&video, &mp3, &dst, &TranscodePolicy::default()).unwrap();

        let (video_secs, audio_secs) = track_durations(&dst);
        let audio_secs = audio_secs.unwrap();
        assert!((video_secs - 1.0).abs() < TOLERANCE_SECS, "video lasts {video_secs}s");
        assert!(
            (audio_secs - video_secs).abs() < TOLERANCE_SECS,
            "audio {audio_secs}s vs video {video_secs}s",
        );
        assert!(!mp3.exists(), "degraded audio should be deleted after the merge");
    }

    #[test]
    fn short_overlay_on_silent_video_is_padded_to_length() {
        if !ffmpeg_ready() { return; }
        let tmp = tempfile::tempdir().unwrap();
        let video = tmp.path().join("gen1.mp4");
        let mp3 = tmp.path().join("gen1.mp3");
        let dst = tmp.path().join("merged.mp4");
        write_clip(&video, &ClipSpec { audio_secs: None, ..ClipSpec::small(1.0) }).unwrap();
        tone_mp3(&mp3, 0.3);

        remux(&video, &mp3, &dst, &TranscodePolicy::default()).unwrap();

        let (video_secs, audio_secs) = track_durations(&dst);
        let audio_secs = audio_secs.unwrap();
        assert!(
            (audio_secs - video_secs).abs() < TOLERANCE_SECS,
            "audio {audio_secs}s vs video {video_secs}s",
        );
    }
}
