// crates/genloss-core/src/ladder.rs
//
// Quality ladders and the rung resolver.
//
// A ladder is an immutable, best-first list of rungs. The pipeline walks it one
// rung per generation and parks on the last rung once it gets there.
//
// Two lookups exist and they deliberately disagree:
//   • `snap`: nearest rung, used once at run start on probed values.
//   • `exact_index`: verbatim membership, used mid-run; a miss resets to 0.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// ── Rungs ─────────────────────────────────────────────────────────────────────

/// One step on the resolution ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionRung {
    pub width:  u32,
    pub height: u32,
}

impl ResolutionRung {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// YUV420P halves chroma in both directions, so both sides must be even.
    pub const fn is_yuv420_compatible(&self) -> bool {
        self.width > 0 && self.height > 0 && self.width % 2 == 0 && self.height % 2 == 0
    }
}

impl std::fmt::Display for ResolutionRung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One step on the frame-rate ladder, in whole frames per second.
pub type FrameRateRung = u32;

/// A value a ladder can hold.
pub trait Rung: Copy + PartialEq + std::fmt::Display {
    /// Distance between two rungs of the same kind. Used by `snap`.
    fn distance(&self, other: &Self) -> u64;

    /// Whether the encoder can actually produce this rung.
    fn is_encodable(&self) -> bool;
}

impl Rung for ResolutionRung {
    /// Summed absolute difference of width and height.
    fn distance(&self, other: &Self) -> u64 {
        (self.width as i64 - other.width as i64).unsigned_abs()
            + (self.height as i64 - other.height as i64).unsigned_abs()
    }

    fn is_encodable(&self) -> bool { self.is_yuv420_compatible() }
}

impl Rung for u32 {
    fn distance(&self, other: &Self) -> u64 {
        (*self as i64 - *other as i64).unsigned_abs()
    }

    fn is_encodable(&self) -> bool { *self > 0 }
}

// ── Ladder ────────────────────────────────────────────────────────────────────

/// Immutable ordered rung list, best quality first. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ladder<T> {
    rungs: Vec<T>,
}

impl<T: Rung> Ladder<T> {
    /// Rejects an empty ladder and any rung the encoder can't produce (odd
    /// frame sizes, 0 fps).
    pub fn new(rungs: Vec<T>) -> Result<Self, PipelineError> {
        if rungs.is_empty() {
            return Err(PipelineError::InvalidConfig("ladder must have at least one rung".into()));
        }
        if let Some(bad) = rungs.iter().find(|r| !r.is_encodable()) {
            return Err(PipelineError::InvalidConfig(format!("ladder rung {bad} cannot be encoded")));
        }
        Ok(Self { rungs })
    }

    pub fn len(&self) -> usize { self.rungs.len() }

    pub fn last_index(&self) -> usize { self.rungs.len() - 1 }

    /// Rung at `index`, clamped to the floor.
    pub fn rung(&self, index: usize) -> T {
        self.rungs[index.min(self.last_index())]
    }

    /// Index of the rung nearest to `measured`. Ties go to the better rung.
    pub fn snap(&self, measured: &T) -> usize {
        let mut best = 0;
        let mut best_dist = u64::MAX;
        for (i, rung) in self.rungs.iter().enumerate() {
            let d = rung.distance(measured);
            if d < best_dist {
                best = i;
                best_dist = d;
            }
        }
        best
    }

    /// Next rung down, clamped at the floor.
    pub fn advance(&self, index: usize) -> usize {
        (index + 1).min(self.last_index())
    }

    /// Verbatim membership lookup. A value that is not on the ladder maps to
    /// index 0 (best quality), not to its nearest rung.
    pub fn exact_index(&self, value: &T) -> usize {
        self.rungs.iter().position(|r| r == value).unwrap_or(0)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.rungs.contains(value)
    }
}

/// 1080p → 720p → 480p → 360p → 240p.
pub fn default_resolution_ladder() -> Ladder<ResolutionRung> {
    Ladder {
        rungs: vec![
            ResolutionRung::new(1920, 1080),
            ResolutionRung::new(1280, 720),
            ResolutionRung::new(854, 480),
            ResolutionRung::new(640, 360),
            ResolutionRung::new(426, 240),
        ],
    }
}

/// 60 → 30 → 24 → 18 fps.
pub fn default_frame_rate_ladder() -> Ladder<FrameRateRung> {
    Ladder { rungs: vec![60, 30, 24, 18] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ladder_rejected() {
        assert!(Ladder::<u32>::new(vec![]).is_err());
    }

    #[test]
    fn odd_or_zero_rungs_rejected() {
        let odd = Ladder::new(vec![ResolutionRung::new(1280, 720), ResolutionRung::new(853, 480)]);
        assert!(matches!(odd, Err(PipelineError::InvalidConfig(m)) if m.contains("853x480")));
        assert!(Ladder::new(vec![ResolutionRung::new(640, 0)]).is_err());
        assert!(Ladder::<u32>::new(vec![30, 0]).is_err());

        let ok = Ladder::new(vec![ResolutionRung::new(640, 360), ResolutionRung::new(426, 240)]);
        assert_eq!(ok.map(|l| l.len()).ok(), Some(2));
    }

    #[test]
    fn default_ladders_are_encodable() {
        let res = default_resolution_ladder();
        assert!((0..res.len()).all(|i| res.rung(i).is_yuv420_compatible()));
        let fps = default_frame_rate_ladder();
        assert!((0..fps.len()).all(|i| fps.rung(i) > 0));
    }

    #[test]
    fn snap_picks_nearest_resolution() {
        let l = default_resolution_ladder();
        assert_eq!(l.snap(&ResolutionRung::new(1920, 1080)), 0);
        // 1366x768 is 168 from 720p and 866 from 1080p.
        assert_eq!(l.snap(&ResolutionRung::new(1366, 768)), 1);
        // Portrait and tiny inputs land somewhere sane.
        assert_eq!(l.snap(&ResolutionRung::new(320, 180)), 4);
        assert_eq!(l.snap(&ResolutionRung::new(3840, 2160)), 0);
    }

    #[test]
    fn snap_picks_nearest_frame_rate() {
        let l = default_frame_rate_ladder();
        assert_eq!(l.snap(&25), 2);
        assert_eq!(l.snap(&29), 1);
        assert_eq!(l.snap(&120), 0);
        assert_eq!(l.snap(&10), 3);
    }

    #[test]
    fn snap_tie_prefers_better_rung() {
        // 27 is 3 from both 30 and 24.
        assert_eq!(default_frame_rate_ladder().snap(&27), 1);
    }

    #[test]
    fn advance_clamps_at_floor() {
        let l = default_frame_rate_ladder();
        assert_eq!(l.advance(0), 1);
        assert_eq!(l.advance(2), 3);
        assert_eq!(l.advance(3), 3);
        assert_eq!(l.advance(99), 3);
    }

    #[test]
    fn exact_index_resets_on_miss() {
        let l = default_resolution_ladder();
        assert_eq!(l.exact_index(&ResolutionRung::new(854, 480)), 2);
        assert_eq!(l.exact_index(&ResolutionRung::new(856, 480)), 0);
        assert_eq!(default_frame_rate_ladder().exact_index(&25), 0);
    }

    #[test]
    fn rung_lookup_clamps() {
        let l = default_frame_rate_ladder();
        assert_eq!(l.rung(0), 60);
        assert_eq!(l.rung(10), 18);
    }
}
