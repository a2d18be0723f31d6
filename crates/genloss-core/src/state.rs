// crates/genloss-core/src/state.rs
// Cross-generation quality state. Owned by the iteration controller only.

use crate::ladder::{FrameRateRung, Ladder, ResolutionRung};

/// Where the run currently sits on each ladder.
///
/// Indices only ever move towards the floor. Once both sit on the last rung
/// the state is a fixed point: further generations still run, but report the
/// same rung.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationState {
    pub resolution_idx: usize,
    pub frame_rate_idx: usize,
}

/// Target rungs for the next generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetRungs {
    pub resolution: ResolutionRung,
    pub frame_rate: FrameRateRung,
}

impl GenerationState {
    /// Initial state from probed values, snapped to the nearest rungs.
    pub fn snapped(
        measured_res: ResolutionRung,
        measured_fps: FrameRateRung,
        res_ladder:   &Ladder<ResolutionRung>,
        fps_ladder:   &Ladder<FrameRateRung>,
    ) -> Self {
        Self {
            resolution_idx: res_ladder.snap(&measured_res),
            frame_rate_idx: fps_ladder.snap(&measured_fps),
        }
    }

    pub fn resolution(&self, ladder: &Ladder<ResolutionRung>) -> ResolutionRung {
        ladder.rung(self.resolution_idx)
    }

    pub fn frame_rate(&self, ladder: &Ladder<FrameRateRung>) -> FrameRateRung {
        ladder.rung(self.frame_rate_idx)
    }

    /// Rungs one step down from the current values.
    ///
    /// The current values are looked up by exact membership, so a value that
    /// has drifted off the ladder restarts from the top rung.
    pub fn next_targets(
        &self,
        res_ladder: &Ladder<ResolutionRung>,
        fps_ladder: &Ladder<FrameRateRung>,
    ) -> TargetRungs {
        let res_idx = res_ladder.exact_index(&self.resolution(res_ladder));
        let fps_idx = fps_ladder.exact_index(&self.frame_rate(fps_ladder));
        TargetRungs {
            resolution: res_ladder.rung(res_ladder.advance(res_idx)),
            frame_rate: fps_ladder.rung(fps_ladder.advance(fps_idx)),
        }
    }

    /// Fold the rung a transcode actually achieved back into index form.
    pub fn record_achieved(
        &mut self,
        achieved:   TargetRungs,
        res_ladder: &Ladder<ResolutionRung>,
        fps_ladder: &Ladder<FrameRateRung>,
    ) {
        if !res_ladder.contains(&achieved.resolution) {
            log::warn!("[state] achieved resolution {} is off-ladder; resetting to top rung",
                achieved.resolution);
        }
        if !fps_ladder.contains(&achieved.frame_rate) {
            log::warn!("[state] achieved frame rate {} is off-ladder; resetting to top rung",
                achieved.frame_rate);
        }
        self.resolution_idx = res_ladder.exact_index(&achieved.resolution);
        self.frame_rate_idx = fps_ladder.exact_index(&achieved.frame_rate);
    }

    pub fn at_floor(
        &self,
        res_ladder: &Ladder<ResolutionRung>,
        fps_ladder: &Ladder<FrameRateRung>,
    ) -> bool {
        self.resolution_idx >= res_ladder.last_index()
            && self.frame_rate_idx >= fps_ladder.last_index()
    }
}
