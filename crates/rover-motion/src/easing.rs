//! Sine ease-in/ease-out profile.
//!
//! Converts linear time progress into a position that starts and ends with
//! zero velocity, avoiding mechanical jerk and motor current spikes.

use std::f32::consts::{FRAC_PI_2, PI};

/// Map normalized time `t ∈ [0, 1]` to a normalized output `s ∈ [0, 1]`.
///
/// Defined as `(sin(t·π − π/2) + 1) / 2`.  Pure and deterministic; the
/// domain is total over `[0, 1]` and callers must clamp `t` before calling.
pub fn ease(t: f32) -> f32 {
    ((t * PI - FRAC_PI_2).sin() + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn endpoints_are_exact() {
        assert!(ease(0.0).abs() < EPS);
        assert!((ease(1.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn midpoint_is_half() {
        assert!((ease(0.5) - 0.5).abs() < EPS);
    }

    #[test]
    fn monotonic_non_decreasing() {
        let mut prev = ease(0.0);
        for i in 1..=1000 {
            let s = ease(i as f32 / 1000.0);
            assert!(
                s >= prev - EPS,
                "ease must be monotonic, decreased at t={}",
                i as f32 / 1000.0
            );
            prev = s;
        }
    }

    #[test]
    fn symmetric_about_midpoint() {
        for i in 0..=100 {
            let t = i as f32 / 100.0;
            assert!(
                (ease(t) - (1.0 - ease(1.0 - t))).abs() < EPS,
                "ease({t}) must equal 1 - ease(1 - {t})"
            );
        }
    }

    #[test]
    fn output_stays_in_unit_interval() {
        for i in 0..=500 {
            let s = ease(i as f32 / 500.0);
            assert!((-EPS..=1.0 + EPS).contains(&s));
        }
    }
}
