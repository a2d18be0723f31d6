// crates/genloss-media/src/helpers/audio_enc.rs
//
// Planar f32 audio encoder stream: sample FIFO + encoder + packet drain.
//
// Encoders such as AAC (1024) and MP3 (1152) want exactly `frame_size`
// samples per input frame. Decoded/resampled audio arrives in arbitrary chunk
// sizes, so everything goes through a planar FIFO first; full frames are
// popped from the front, and at the very end the tail goes out as one short
// frame carrying only the samples that are left.
//
// Packets are handed to a caller-supplied sink already tagged with the output
// stream index and rescaled to the muxer's time base. The transcoder's sink
// writes them straight to the muxer; the remuxer's sink queues them for
// interleaving with copied video packets.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::context::Output;
use ffmpeg::format::sample::{Sample, Type as SampleType};
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use crate::error::StepError;
use crate::helpers::mux::encoder_params_to_stream;

// ── FIFO ──────────────────────────────────────────────────────────────────────

/// Per-channel sample buffer. Mono or stereo.
pub struct PlanarFifo {
    planes: Vec<Vec<f32>>,
}

impl PlanarFifo {
    pub fn new(channels: usize) -> Self {
        Self { planes: vec![Vec::new(); channels.clamp(1, 2)] }
    }

    pub fn channels(&self) -> usize { self.planes.len() }

    /// Samples buffered per channel.
    pub fn len(&self) -> usize { self.planes[0].len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Append one FLTP frame. A frame with fewer channels than the FIFO is
    /// spread across all of them (mono → both sides).
    pub fn push_frame(&mut self, frame: &AudioFrame) {
        let n = frame.samples();
        if n == 0 { return; }
        let src_channels = (frame.ch_layout().channels() as usize).max(1);
        for (ch, plane) in self.planes.iter_mut().enumerate() {
            let src = if ch < src_channels { ch } else { 0 };
            unsafe {
                let bytes = frame.data(src);
                let samples = std::slice::from_raw_parts(bytes.as_ptr() as *const f32, n);
                plane.extend_from_slice(samples);
            }
        }
    }

    /// Append interleaved samples laid out with this FIFO's channel count.
    /// A trailing partial sample group is ignored.
    pub fn push_interleaved(&mut self, samples: &[f32]) {
        let channels = self.channels();
        for group in samples.chunks_exact(channels) {
            for (plane, s) in self.planes.iter_mut().zip(group) {
                plane.push(*s);
            }
        }
    }

    pub fn push_silence(&mut self, n: usize) {
        for plane in &mut self.planes {
            plane.resize(plane.len() + n, 0.0);
        }
    }

    /// Drop everything past the first `n` samples per channel.
    pub fn truncate(&mut self, n: usize) {
        for plane in &mut self.planes {
            plane.truncate(n);
        }
    }

    /// Pop up to `n` samples per channel, zero-padding to exactly `n`.
    pub fn pop_planes(&mut self, n: usize) -> Vec<Vec<f32>> {
        let available = self.len().min(n);
        self.planes
            .iter_mut()
            .map(|plane| {
                let mut out: Vec<f32> = plane.drain(..available).collect();
                out.resize(n, 0.0);
                out
            })
            .collect()
    }
}

// ── Encoder stream ────────────────────────────────────────────────────────────

/// Codec choice for an `AudioStreamEncoder`.
pub struct AudioEncoderSpec {
    pub codec:    CodecId,
    pub rate:     u32,
    pub channels: usize,
    pub bit_rate: usize,
}

pub struct AudioStreamEncoder {
    encoder:        ffmpeg::encoder::Audio,
    pub fifo:       PlanarFifo,
    frame_size:     usize,
    /// Next output frame's PTS in samples (encoder timebase = 1/rate).
    out_sample_idx: i64,
    rate:           u32,
    stream_index:   usize,
    audio_tb:       Rational,
    /// The muxer-assigned timebase; only final after `write_header`.
    ost_tb:         Rational,
}

impl AudioStreamEncoder {
    /// Add an audio stream at `stream_index` to `octx` and open its encoder.
    /// Must be called before `write_header`.
    pub fn add_to(
        octx:         &mut Output,
        stream_index: usize,
        spec:         AudioEncoderSpec,
    ) -> Result<Self, StepError> {
        let codec = encoder::find(spec.codec)
            .ok_or_else(|| StepError::Unavailable(format!("{:?} audio encoder not found", spec.codec)))?;

        let audio_tb = Rational::new(1, spec.rate as i32);
        let channels = spec.channels.clamp(1, 2);

        let mut ost = octx.add_stream(codec)
            .map_err(|e| format!("add audio stream: {e}"))?;
        ost.set_time_base(audio_tb);

        let enc_ctx = codec::context::Context::new_with_codec(codec);
        let mut enc = enc_ctx.encoder().audio()
            .map_err(|e| format!("create audio encoder context: {e}"))?;

        enc.set_rate(spec.rate as i32);
        enc.set_ch_layout(if channels == 1 { ChannelLayout::MONO } else { ChannelLayout::STEREO });
        enc.set_format(Sample::F32(SampleType::Planar));
        enc.set_bit_rate(spec.bit_rate);

        let encoder = enc.open_as_with(codec, ffmpeg::Dictionary::new())
            .map_err(|e| format!("open {:?} encoder: {e}", spec.codec))?;

        // Codecs with variable frame size report 0; fall back to AAC's 1024.
        let frame_size = match encoder.frame_size() as usize {
            0 => 1024,
            n => n,
        };

        encoder_params_to_stream(
            octx,
            stream_index,
            encoder.as_ptr() as *const ffmpeg::ffi::AVCodecContext,
        )?;

        Ok(Self {
            encoder,
            fifo: PlanarFifo::new(channels),
            frame_size,
            out_sample_idx: 0,
            rate: spec.rate,
            stream_index,
            audio_tb,
            ost_tb: audio_tb,
        })
    }

    /// Pick up the time base the muxer settled on. Call after `write_header`.
    pub fn bind_output(&mut self, octx: &Output) {
        if let Some(stream) = octx.stream(self.stream_index) {
            self.ost_tb = stream.time_base();
        }
    }

    /// Samples pushed through the encoder so far, per channel.
    pub fn samples_encoded(&self) -> i64 { self.out_sample_idx }

    /// Encode full frames while the stream stays at or below `limit` samples
    /// per channel. Lets a caller hold audio back until the picture catches up.
    pub fn drain_until<F>(&mut self, limit: i64, sink: &mut F) -> Result<(), String>
    where
        F: FnMut(Packet) -> Result<(), String>,
    {
        let frame = self.frame_size as i64;
        while self.fifo.len() >= self.frame_size && self.out_sample_idx.saturating_add(frame) <= limit {
            self.encode_frame(self.frame_size, sink)?;
        }
        Ok(())
    }

    /// Cut or pad the buffered audio so the finished stream holds exactly
    /// `total` samples per channel. Samples already encoded stay as they are.
    pub fn fit_total(&mut self, total: usize) {
        let encoded = self.out_sample_idx.max(0) as usize;
        let keep = total.saturating_sub(encoded);
        let have = self.fifo.len();
        if have > keep {
            self.fifo.truncate(keep);
        } else {
            self.fifo.push_silence(keep - have);
        }
    }

    /// Encode everything left in the FIFO, send EOF, and drain the encoder
    /// completely. The tail goes out as a short final frame, so the stream
    /// ends on the last real sample.
    pub fn finish<F>(&mut self, sink: &mut F) -> Result<(), String>
    where
        F: FnMut(Packet) -> Result<(), String>,
    {
        self.drain_until(i64::MAX, sink)?;
        if !self.fifo.is_empty() {
            let n = self.fifo.len().min(self.frame_size);
            self.encode_frame(n, sink)?;
        }
        self.encoder.send_eof()
            .map_err(|e| format!("send EOF to audio encoder: {e}"))?;
        self.drain_packets(sink)
    }

    fn encode_frame<F>(&mut self, n: usize, sink: &mut F) -> Result<(), String>
    where
        F: FnMut(Packet) -> Result<(), String>,
    {
        let frame = self.pop_frame(n);
        self.out_sample_idx += n as i64;
        self.encoder.send_frame(&frame)
            .map_err(|e| format!("send audio frame to encoder: {e}"))?;
        self.drain_packets(sink)
    }

    /// Build a frame of `n` samples per channel from the front of the FIFO.
    /// Only the final frame of a stream may be shorter than `frame_size`.
    fn pop_frame(&mut self, n: usize) -> AudioFrame {
        let mask = if self.fifo.channels() == 1 { ChannelLayoutMask::MONO } else { ChannelLayoutMask::STEREO };

        let mut frame = AudioFrame::new(Sample::F32(SampleType::Planar), n, mask);
        frame.set_rate(self.rate);
        frame.set_pts(Some(self.out_sample_idx));

        for (ch, plane) in self.fifo.pop_planes(n).into_iter().enumerate() {
            unsafe {
                let data = frame.data_mut(ch);
                let dst = std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut f32, n);
                dst.copy_from_slice(&plane);
            }
        }
        frame
    }

    fn drain_packets<F>(&mut self, sink: &mut F) -> Result<(), String>
    where
        F: FnMut(Packet) -> Result<(), String>,
    {
        loop {
            let mut pkt = Packet::empty();
            if self.encoder.receive_packet(&mut pkt).is_err() { break; }
            pkt.set_stream(self.stream_index);
            pkt.rescale_ts(self.audio_tb, self.ost_tb);
            sink(pkt)?;
        }
        Ok(())
    }
}
