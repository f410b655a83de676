//! Velocity decay
//!
//! Projects a value forward from an initial velocity with exponential
//! deceleration, the way a flung list keeps scrolling after release.
//! Deceleration is a per-millisecond factor: after `dt` ms the velocity is
//! `v * deceleration^dt`, and the distance covered is the closed-form sum of
//! that geometric series.

use serde::{Deserialize, Serialize};

use super::value::Components;
use crate::error::{MotiveError, Result};

/// Configuration for a decay animation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Per-millisecond velocity retention, strictly between 0 and 1.
    pub deceleration: f64,
    /// The run completes once every component is slower than this
    /// (units per second).
    pub velocity_threshold: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            deceleration: 0.998,
            velocity_threshold: 1.0,
        }
    }
}

impl DecayConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.deceleration > 0.0 && self.deceleration < 1.0) {
            return Err(MotiveError::invalid(
                "decay",
                format!("deceleration must be in (0, 1), got {}", self.deceleration),
            ));
        }
        if !(self.velocity_threshold.is_finite() && self.velocity_threshold > 0.0) {
            return Err(MotiveError::invalid(
                "decay",
                format!("velocity threshold must be positive, got {}", self.velocity_threshold),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct DecayState {
    config: DecayConfig,
    position: Components,
    velocity: Components,
    clamp: Option<(Components, Components)>,
}

impl DecayState {
    pub(crate) fn new(
        config: DecayConfig,
        from: Components,
        velocity: Components,
        clamp: Option<(Components, Components)>,
    ) -> Self {
        let mut velocity = velocity;
        velocity.resize(from.len(), 0.0);
        Self {
            config,
            position: from,
            velocity,
            clamp,
        }
    }

    pub(crate) fn position(&self) -> &Components {
        &self.position
    }

    pub(crate) fn velocity(&self) -> &Components {
        &self.velocity
    }

    /// Advance by `dt_ms`. Returns `true` when the decay has stopped.
    pub(crate) fn step(&mut self, dt_ms: f64) -> bool {
        let d = self.config.deceleration;
        let dt = dt_ms.max(0.0);
        let kv = d.powf(dt);
        let kx = d * (1.0 - kv) / (1.0 - d);

        for i in 0..self.position.len() {
            self.position[i] += self.velocity[i] / 1000.0 * kx;
            self.velocity[i] *= kv;
        }

        let mut hit_bound = false;
        if let Some((lo, hi)) = &self.clamp {
            for i in 0..self.position.len() {
                let (lo, hi) = (lo.get(i).copied(), hi.get(i).copied());
                if let Some(lo) = lo {
                    if self.position[i] < lo {
                        self.position[i] = lo;
                        hit_bound = true;
                    }
                }
                if let Some(hi) = hi {
                    if self.position[i] > hi {
                        self.position[i] = hi;
                        hit_bound = true;
                    }
                }
            }
        }

        let slow = self
            .velocity
            .iter()
            .all(|v| v.abs() < self.config.velocity_threshold);
        if hit_bound || slow {
            self.velocity.iter_mut().for_each(|v| *v = 0.0);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn decelerates_and_stops() {
        let mut decay =
            DecayState::new(DecayConfig::default(), smallvec![0.0], smallvec![1000.0], None);
        let mut last_velocity = 1000.0;
        let mut frames = 0;
        while !decay.step(16.0) {
            let v = decay.velocity()[0];
            assert!(v < last_velocity);
            last_velocity = v;
            frames += 1;
            assert!(frames < 1000);
        }
        // Total travel of a geometric series: v/1000 * d/(1-d) = 499 units.
        let x = decay.position()[0];
        assert!(x > 490.0 && x < 500.0, "travelled {x}");
    }

    #[test]
    fn stops_at_clamp() {
        let mut decay = DecayState::new(
            DecayConfig::default(),
            smallvec![0.0],
            smallvec![2000.0],
            Some((smallvec![-50.0], smallvec![100.0])),
        );
        while !decay.step(16.0) {}
        assert_eq!(decay.position()[0], 100.0);
        assert_eq!(decay.velocity()[0], 0.0);
    }

    #[test]
    fn validation() {
        assert!(DecayConfig::default().validate().is_ok());
        let bad = DecayConfig {
            deceleration: 1.0,
            ..DecayConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
