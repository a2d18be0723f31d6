// crates/genloss-media/src/degrade.rs
//
// Audio degradation: pull the audio out of a generation file, run it through
// the PCM degradation chain, and export it as a low-bitrate MP3.
//
// Decode and resample happen here (FFmpeg); bit-depth reduction, low-pass and
// the hiss overlay are plain sample maths in genloss_core::helpers::dsp.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::Id as CodecId;
use ffmpeg::format::output as open_output;
use ffmpeg::Packet;

use genloss_core::config::AudioPolicy;
use genloss_core::helpers::dsp::degrade_pcm;
use genloss_core::helpers::time::format_duration;

use crate::error::StepError;
use crate::helpers::audio_enc::{AudioEncoderSpec, AudioStreamEncoder};
use crate::helpers::mux::verify_output;
use crate::helpers::pcm::{decode_audio, PcmLayout};

/// Degrade `video`'s audio track into `audio_out` (overwritten). Blocking.
pub fn degrade_audio(video: &Path, audio_out: &Path, policy: &AudioPolicy) -> Result<(), StepError> {
    // Mono at the target rate in one resampler pass: downmix + resample.
    let pcm = decode_audio(video, policy.sample_rate, PcmLayout::Mono)?
        .ok_or_else(|| format!("'{}' has no audio track", video.display()))?;
    if pcm.is_empty() {
        return Err(format!("no audio samples decoded from '{}'", video.display()).into());
    }

    let secs = pcm.len() as f64 / policy.sample_rate as f64;
    let degraded = degrade_pcm(pcm, policy);

    write_mp3(audio_out, &degraded, policy)?;
    log::debug!(
        "[degrade] {} of audio at {} Hz / {}-bit → {}",
        format_duration(secs), policy.sample_rate, policy.bit_depth, audio_out.display(),
    );
    Ok(())
}

/// Encode mono f32 `samples` at `policy.sample_rate` as MP3.
pub(crate) fn write_mp3(path: &Path, samples: &[f32], policy: &AudioPolicy) -> Result<(), StepError> {
    let mut octx = open_output(&path)
        .map_err(|e| format!("could not open output '{}': {e}", path.display()))?;

    let mut audio = AudioStreamEncoder::add_to(&mut octx, 0, AudioEncoderSpec {
        codec:    CodecId::MP3,
        rate:     policy.sample_rate,
        channels: 1,
        bit_rate: policy.bitrate,
    })?;

    octx.write_header()
        .map_err(|e| format!("write mp3 header: {e}"))?;
    audio.bind_output(&octx);

    audio.fifo.push_interleaved(samples);
    audio.finish(&mut |pkt: Packet| {
        pkt.write_interleaved(&mut octx)
            .map_err(|e| format!("write mp3 packet: {e}"))
    })?;

    octx.write_trailer()
        .map_err(|e| format!("write mp3 trailer: {e}"))?;

    verify_output(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::test_clip::{ffmpeg_ready, write_clip, ClipSpec};

    #[test]
    fn writes_a_decodable_mp3_of_the_same_length() {
        if !ffmpeg_ready() { return; }
        let tmp = tempfile::tempdir().unwrap();
        let clip = tmp.path().join("gen1.mp4");
        let mp3 = tmp.path().join("gen1.mp3");
        write_clip(&clip, &ClipSpec::small(1.0)).unwrap();

        let policy = AudioPolicy { noise_seed: Some(7), ..AudioPolicy::default() };
        degrade_audio(&clip, &mp3, &policy).unwrap();

        let pcm = decode_audio(&mp3, policy.sample_rate, PcmLayout::Mono).unwrap().unwrap();
        let secs = pcm.len() as f64 / policy.sample_rate as f64;
        assert!((secs - 1.0).abs() < 0.15, "mp3 lasts {secs}s");
        assert!(pcm.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn video_without_audio_is_an_error() {
        if !ffmpeg_ready() { return; }
        let tmp = tempfile::tempdir().unwrap();
        let clip = tmp.path().join("silent.mp4");
        let mp3 = tmp.path().join("silent.mp3");
        write_clip(&clip, &ClipSpec { audio_secs: None, ..ClipSpec::small(0.5) }).unwrap();

        let err = degrade_audio(&clip, &mp3, &AudioPolicy::default()).unwrap_err();
        assert!(matches!(err, StepError::Failed(m) if m.contains("no audio track")));
    }
}
