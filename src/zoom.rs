//! Zoom state producing the scale signal for render requests

/// User zoom state; keeps the scale factor the session renders at inside
/// sane bounds so a render request is never issued with a degenerate
/// scale.
#[derive(Clone, Copy, Debug)]
pub struct Zoom {
    factor: f32,
}

impl Default for Zoom {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl Zoom {
    /// Zoom in rate multiplier per step - 10%
    pub const ZOOM_IN_RATE: f32 = 1.1;
    /// Zoom out rate divisor per step - 5%
    pub const ZOOM_OUT_RATE: f32 = 1.05;
    /// Minimum allowed zoom factor
    pub const MIN_SCALE: f32 = 0.1;
    /// Maximum allowed zoom factor
    pub const MAX_SCALE: f32 = 8.0;

    /// Current zoom factor (1.0 = 100%)
    #[must_use]
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Zoom in by one step
    pub fn step_in(&mut self) {
        self.factor = Self::clamp_factor(self.factor * Self::ZOOM_IN_RATE);
    }

    /// Zoom out by one step
    pub fn step_out(&mut self) {
        self.factor = Self::clamp_factor(self.factor / Self::ZOOM_OUT_RATE);
    }

    /// Set an absolute zoom factor, clamped to the allowed range
    pub fn set(&mut self, factor: f32) {
        self.factor = Self::clamp_factor(factor);
    }

    /// Reset to 100%
    pub fn reset(&mut self) {
        self.factor = 1.0;
    }

    fn clamp_factor(factor: f32) -> f32 {
        if factor.is_finite() {
            factor.clamp(Self::MIN_SCALE, Self::MAX_SCALE)
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_in_and_out_stay_in_bounds() {
        let mut zoom = Zoom::default();
        for _ in 0..200 {
            zoom.step_in();
        }
        assert!((zoom.factor() - Zoom::MAX_SCALE).abs() < f32::EPSILON);

        for _ in 0..500 {
            zoom.step_out();
        }
        assert!((zoom.factor() - Zoom::MIN_SCALE).abs() < f32::EPSILON);
    }

    #[test]
    fn set_rejects_non_finite() {
        let mut zoom = Zoom::default();
        zoom.set(f32::NAN);
        assert!((zoom.factor() - 1.0).abs() < f32::EPSILON);

        zoom.set(0.0);
        assert!((zoom.factor() - Zoom::MIN_SCALE).abs() < f32::EPSILON);
    }
}
