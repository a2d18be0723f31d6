// crates/genloss-media/src/helpers/pcm.rs
//
// Decoded audio → resampled f32 PCM.
//
// The resampler is built lazily on the first decoded frame so we know the
// real source format/layout/rate before constructing the SwrContext.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::format::sample::{Sample, Type as SampleType};
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::frame::audio::Audio as AudioFrame;

/// Target channel layout for resampled PCM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcmLayout {
    Mono,
    Stereo,
}

impl PcmLayout {
    pub fn channels(self) -> usize {
        match self {
            PcmLayout::Mono   => 1,
            PcmLayout::Stereo => 2,
        }
    }
}

const MONO_LAYOUT:   ChannelLayout = ChannelLayout::MONO;
const STEREO_LAYOUT: ChannelLayout = ChannelLayout::STEREO;

/// SwrContext that converts any decoded frame to `format`/`layout`/`rate`.
pub struct LazyResampler {
    ctx:    Option<resampling::Context>,
    format: Sample,
    layout: PcmLayout,
    rate:   u32,
}

impl LazyResampler {
    pub fn new(format: Sample, layout: PcmLayout, rate: u32) -> Self {
        Self { ctx: None, format, layout, rate }
    }

    /// Resample one frame. `Ok(None)` when swr buffered everything and has
    /// nothing to hand back yet.
    pub fn run(&mut self, frame: &AudioFrame) -> Result<Option<AudioFrame>, String> {
        if self.ctx.is_none() {
            // Mono sources must be declared as MONO or swr will misinterpret
            // the channel layout.
            let src_layout = if frame.ch_layout().channels() >= 2 {
                frame.ch_layout()
            } else {
                ChannelLayout::MONO
            };
            let dst_layout = match self.layout {
                PcmLayout::Mono   => MONO_LAYOUT,
                PcmLayout::Stereo => STEREO_LAYOUT,
            };
            let ctx = resampling::Context::get2(
                frame.format(), src_layout, frame.rate(),
                self.format,    dst_layout, self.rate,
            ).map_err(|e| format!("create audio resampler: {e}"))?;
            self.ctx = Some(ctx);
        }
        let Some(rs) = self.ctx.as_mut() else { return Ok(None) };

        let mut out = AudioFrame::empty();
        rs.run(frame, &mut out).map_err(|e| format!("resample audio: {e}"))?;
        Ok(if out.samples() > 0 { Some(out) } else { None })
    }
}

/// Decode every audio sample in `path` to interleaved f32 at `rate` with
/// `layout`. `Ok(None)` when the file has no audio stream at all.
pub fn decode_audio(path: &Path, rate: u32, layout: PcmLayout) -> Result<Option<Vec<f32>>, String> {
    let mut ictx = input(&path).map_err(|e| format!("open '{}': {e}", path.display()))?;

    let Some(audio_stream_idx) = ictx.streams().best(MediaType::Audio).map(|s| s.index()) else {
        return Ok(None);
    };

    let mut decoder = {
        let stream = ictx.stream(audio_stream_idx)
            .ok_or_else(|| "audio stream vanished".to_string())?;
        let ctx = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| format!("audio codec context: {e}"))?;
        ctx.decoder().audio().map_err(|e| format!("open audio decoder: {e}"))?
    };

    let mut resampler = LazyResampler::new(Sample::F32(SampleType::Packed), layout, rate);
    let channels = layout.channels();
    let mut pcm: Vec<f32> = Vec::new();

    for result in ictx.packets() {
        // Soft-fail: a bad packet costs a few milliseconds of audio, not the run.
        let Ok((stream, packet)) = result else { continue };
        if stream.index() != audio_stream_idx { continue; }
        if decoder.send_packet(&packet).is_err() { continue; }

        let mut frame = AudioFrame::empty();
        while decoder.receive_frame(&mut frame).is_ok() {
            if let Some(out) = resampler.run(&frame)? {
                append_packed_f32(&out, channels, &mut pcm);
            }
        }
    }

    let _ = decoder.send_eof();
    let mut frame = AudioFrame::empty();
    while decoder.receive_frame(&mut frame).is_ok() {
        if let Some(out) = resampler.run(&frame)? {
            append_packed_f32(&out, channels, &mut pcm);
        }
    }

    Ok(Some(pcm))
}

/// Copy the packed f32 samples from `frame` into `out`. Packed audio keeps all
/// channels interleaved in plane 0; only `samples × channels` values are real,
/// the rest of the plane is alignment padding.
fn append_packed_f32(frame: &AudioFrame, channels: usize, out: &mut Vec<f32>) {
    let wanted = frame.samples() * channels * 4;
    let data = frame.data(0);
    let data = &data[..wanted.min(data.len())];
    out.extend(
        data.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    );
}
