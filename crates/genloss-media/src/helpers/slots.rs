// crates/genloss-media/src/helpers/slots.rs
//
// Output frame-rate conversion by slot assignment.
//
// Output frame k sits at k / fps seconds. Each decoded frame fills every
// still-empty slot that falls before its own time plus half an output frame.
// Going down in rate drops frames; going up repeats them. Times are measured
// from the first decoded frame, so streams with a non-zero start still begin
// at output frame 0.

use std::ops::Range;

/// Keeps exact slot/horizon ties on the "not yet" side.
const TIE_EPS: f64 = 1e-9;

pub struct FrameSlots {
    fps:    f64,
    next:   i64,
    origin: Option<f64>,
}

impl FrameSlots {
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) as f64, next: 0, origin: None }
    }

    /// Output frame indices (= PTS in 1/fps) the frame at `pts_secs` fills.
    /// Empty when the frame should be dropped.
    pub fn take(&mut self, pts_secs: f64) -> Range<i64> {
        let origin  = *self.origin.get_or_insert(pts_secs);
        let horizon = (pts_secs - origin) + 0.5 / self.fps;
        let start   = self.next;
        while (self.next as f64) / self.fps < horizon - TIE_EPS {
            self.next += 1;
        }
        start..self.next
    }

    /// Number of output frames assigned so far.
    pub fn emitted(&self) -> i64 { self.next }
}
