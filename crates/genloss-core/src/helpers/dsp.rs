// crates/genloss-core/src/helpers/dsp.rs
//
// Sample-level audio degradation on f32 PCM in [-1, 1].
//
// The FFmpeg layer decodes, downmixes and resamples; everything after that
// (bit-depth reduction, low-pass, hiss) happens here so it can be tested
// without a codec in sight. `degrade_pcm` applies the steps in their fixed
// order; each one feeds the next, so reordering changes the result.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::AudioPolicy;

/// Convert a dB gain to a linear factor.
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Requantise to `bits` bits per sample, in place.
///
/// 8 bits leaves 256 levels across the full range, which is where the
/// "starved bitrate" grit comes from.
pub fn quantize(samples: &mut [f32], bits: u32) {
    if bits == 0 || bits >= 24 { return; }
    let half_levels = (1u32 << (bits - 1)) as f32;
    for s in samples.iter_mut() {
        let q = (*s * half_levels).round().clamp(-half_levels, half_levels - 1.0);
        *s = q / half_levels;
    }
}

/// Single-pole RC low-pass at `cutoff_hz`, in place.
pub fn low_pass(samples: &mut [f32], cutoff_hz: f32, sample_rate: u32) {
    if samples.is_empty() || cutoff_hz <= 0.0 || sample_rate == 0 { return; }
    let rc    = 1.0 / (cutoff_hz * 2.0 * std::f32::consts::PI);
    let dt    = 1.0 / sample_rate as f32;
    let alpha = dt / (rc + dt);

    let mut prev = samples[0];
    for s in samples.iter_mut().skip(1) {
        prev += alpha * (*s - prev);
        *s = prev;
    }
}

/// Uniform white noise of `len` samples scaled by `gain` (linear).
pub fn noise_bed<R: Rng>(len: usize, gain: f32, rng: &mut R) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0f32..=1.0) * gain).collect()
}

/// Mix `over` additively into `base`, clipping to [-1, 1].
///
/// `over` is truncated to `base.len()`; a shorter `over` only touches the
/// head of `base`. Returns how many samples were mixed. `base` never grows.
pub fn overlay(base: &mut [f32], over: &[f32]) -> usize {
    let n = base.len().min(over.len());
    for (b, o) in base[..n].iter_mut().zip(&over[..n]) {
        *b = (*b + *o).clamp(-1.0, 1.0);
    }
    n
}

/// Steps 3b–5 of the degradation chain on mono PCM already at
/// `policy.sample_rate`: bit-depth reduction, low-pass, then hiss overlay.
pub fn degrade_pcm(mut samples: Vec<f32>, policy: &AudioPolicy) -> Vec<f32> {
    quantize(&mut samples, policy.bit_depth);
    low_pass(&mut samples, policy.cutoff_hz, policy.sample_rate);

    let mut rng = match policy.noise_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None       => StdRng::from_entropy(),
    };
    let hiss = noise_bed(samples.len(), db_to_gain(policy.noise_gain_db), &mut rng);
    overlay(&mut samples, &hiss);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.8)
            .collect()
    }

    fn rms(s: &[f32]) -> f32 {
        (s.iter().map(|x| x * x).sum::<f32>() / s.len().max(1) as f32).sqrt()
    }

    #[test]
    fn minus_40_db_is_one_percent() {
        assert!((db_to_gain(-40.0) - 0.01).abs() < 1e-6);
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn quantize_to_8_bits_leaves_256_levels() {
        let mut s: Vec<f32> = (0..10_000).map(|i| i as f32 / 5_000.0 - 1.0).collect();
        quantize(&mut s, 8);
        let mut levels: Vec<i32> = s.iter().map(|x| (x * 128.0).round() as i32).collect();
        levels.sort_unstable();
        levels.dedup();
        assert!(levels.len() <= 256);
        assert!(s.iter().all(|x| (-1.0..1.0).contains(x)));
    }

    #[test]
    fn quantize_error_bounded_by_half_step() {
        let orig = sine(440.0, 22_050, 2_000);
        let mut q = orig.clone();
        quantize(&mut q, 8);
        let step = 1.0 / 128.0;
        for (a, b) in orig.iter().zip(&q) {
            assert!((a - b).abs() <= step / 2.0 + 1e-6);
        }
    }

    #[test]
    fn low_pass_attenuates_highs_more_than_lows() {
        let rate = 22_050;
        let mut low  = sine(200.0,  rate, 22_050);
        let mut high = sine(8_000.0, rate, 22_050);
        let (low_in, high_in) = (rms(&low), rms(&high));
        low_pass(&mut low,  2_000.0, rate);
        low_pass(&mut high, 2_000.0, rate);
        assert!(rms(&low)  / low_in  > 0.9);
        assert!(rms(&high) / high_in < 0.4);
    }

    #[test]
    fn noise_bed_respects_gain() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = noise_bed(50_000, 0.01, &mut rng);
        assert_eq!(n.len(), 50_000);
        assert!(n.iter().all(|x| x.abs() <= 0.01));
        assert!(rms(&n) > 0.004);
    }

    #[test]
    fn overlay_truncates_longer_input() {
        let mut base = vec![0.1; 4];
        let mixed = overlay(&mut base, &[0.2; 10]);
        assert_eq!(mixed, 4);
        assert_eq!(base.len(), 4);
        assert!(base.iter().all(|x| (x - 0.3).abs() < 1e-6));
    }

    #[test]
    fn overlay_shorter_input_only_touches_head() {
        let mut base = vec![0.5; 6];
        overlay(&mut base, &[0.25, 0.25]);
        assert_eq!(base, vec![0.75, 0.75, 0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn overlay_clips() {
        let mut base = vec![0.9, -0.9];
        overlay(&mut base, &[0.5, -0.5]);
        assert_eq!(base, vec![1.0, -1.0]);
    }

    #[test]
    fn degrade_keeps_length_and_adds_hiss_to_silence() {
        let policy = AudioPolicy { noise_seed: Some(42), ..AudioPolicy::default() };
        let out = degrade_pcm(vec![0.0; 22_050], &policy);
        assert_eq!(out.len(), 22_050);
        let level = rms(&out);
        assert!(level > 0.0 && level < 0.02, "hiss rms {level}");
    }

    #[test]
    fn degrade_is_reproducible_with_seed() {
        let policy = AudioPolicy { noise_seed: Some(3), ..AudioPolicy::default() };
        let input = sine(1_000.0, 22_050, 4_096);
        assert_eq!(degrade_pcm(input.clone(), &policy), degrade_pcm(input, &policy));
    }
}
