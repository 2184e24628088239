//! Mapping of a normalized volume (0.0 - 1.0) onto a sink's native gain range.
//!
//! Sinks do not agree on what "gain" means: some take a linear factor in
//! `[0, 1]`, others a master gain in decibels such as `[-80, +6.02]`. The
//! controller only ever deals in percent and lets the sink's range decide the
//! final value.

/// Closed range of gain values accepted by a sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRange {
    pub min: f32,
    pub max: f32,
}

impl GainRange {
    /// Plain linear gain.
    pub const UNIT: GainRange = GainRange { min: 0.0, max: 1.0 };

    /// Master gain in decibels, the usual range of a hardware mixer line.
    pub const MASTER_DB: GainRange = GainRange {
        min: -80.0,
        max: 6.0206,
    };

    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Map a normalized percent onto this range.
    ///
    /// The percent is clamped to `[0, 1]` first. The result is
    /// `max - (max - min) * (1 - percent)`, kept inside the range.
    pub fn gain_for(&self, percent: f32) -> f32 {
        let percent = clamp_percent(percent);
        let delta = self.max - self.min;
        let gain = self.max - delta * (1.0 - percent);
        gain.max(self.min).min(self.max)
    }

    /// Whether `gain` lies inside the range.
    pub fn contains(&self, gain: f32) -> bool {
        gain >= self.min && gain <= self.max
    }
}

/// Clamp a volume percent into `[0, 1]`. NaN counts as silence.
pub fn clamp_percent(percent: f32) -> f32 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 1.0)
    }
}

/// Convert a gain in decibels to a linear amplitude factor.
pub fn db_to_amplitude(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}
