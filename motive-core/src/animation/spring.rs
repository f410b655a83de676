//! Spring physics
//!
//! A damped harmonic oscillator integrated with RK4. Each frame's time delta
//! is split into sub-steps no longer than the runtime's `spring_substep_ms`,
//! which keeps stiff, heavily damped springs stable at 60fps.

use serde::{Deserialize, Serialize};

use super::value::Components;
use crate::error::{MotiveError, Result};

/// Configuration for a spring animation.
///
/// Velocities are in units per second, displacements in the cell's units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringConfig {
    pub mass: f64,
    pub stiffness: f64,
    pub damping: f64,
    /// Stop as soon as the value crosses the target.
    pub overshoot_clamping: bool,
    pub rest_displacement_threshold: f64,
    pub rest_speed_threshold: f64,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            stiffness: 100.0,
            damping: 10.0,
            overshoot_clamping: false,
            rest_displacement_threshold: 0.01,
            rest_speed_threshold: 2.0,
        }
    }
}

impl SpringConfig {
    pub fn new(mass: f64, stiffness: f64, damping: f64) -> Self {
        Self {
            mass,
            stiffness,
            damping,
            ..Self::default()
        }
    }

    /// A gentle, slow spring.
    pub fn gentle() -> Self {
        Self::new(1.0, 120.0, 14.0)
    }

    /// An underdamped spring with visible overshoot.
    pub fn wobbly() -> Self {
        Self::new(1.0, 180.0, 12.0)
    }

    /// A stiff, snappy spring.
    pub fn stiff() -> Self {
        Self::new(1.0, 400.0, 30.0)
    }

    pub fn with_overshoot_clamping(mut self, clamp: bool) -> Self {
        self.overshoot_clamping = clamp;
        self
    }

    pub fn with_rest_thresholds(mut self, displacement: f64, speed: f64) -> Self {
        self.rest_displacement_threshold = displacement;
        self.rest_speed_threshold = speed;
        self
    }

    /// Damping at which the spring stops oscillating.
    pub fn critical_damping(&self) -> f64 {
        2.0 * (self.stiffness * self.mass).sqrt()
    }

    pub fn is_underdamped(&self) -> bool {
        self.damping < self.critical_damping()
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !positive(self.mass) {
            return Err(MotiveError::invalid(
                "spring",
                format!("mass must be positive, got {}", self.mass),
            ));
        }
        if !positive(self.stiffness) {
            return Err(MotiveError::invalid(
                "spring",
                format!("stiffness must be positive, got {}", self.stiffness),
            ));
        }
        if !non_negative(self.damping) {
            return Err(MotiveError::invalid(
                "spring",
                format!("damping must be non-negative, got {}", self.damping),
            ));
        }
        if !non_negative(self.rest_displacement_threshold)
            || !non_negative(self.rest_speed_threshold)
        {
            return Err(MotiveError::invalid("spring", "rest thresholds must be non-negative"));
        }
        Ok(())
    }
}

/// Integrator state for one spring run.
#[derive(Clone, Debug)]
pub(crate) struct SpringState {
    config: SpringConfig,
    from: Components,
    to: Components,
    position: Components,
    velocity: Components,
}

impl SpringState {
    pub(crate) fn new(
        config: SpringConfig,
        from: Components,
        to: Components,
        velocity: Components,
    ) -> Self {
        let mut velocity = velocity;
        velocity.resize(from.len(), 0.0);
        Self {
            config,
            position: from.clone(),
            from,
            to,
            velocity,
        }
    }

    pub(crate) fn position(&self) -> &Components {
        &self.position
    }

    pub(crate) fn velocity(&self) -> &Components {
        &self.velocity
    }

    /// Snap onto the target and stop.
    pub(crate) fn settle_on_target(&mut self) {
        self.position = self.to.clone();
        self.velocity.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Advance by `dt_ms`. Returns `true` once the spring is at rest.
    pub(crate) fn step(&mut self, dt_ms: f64, substep_ms: f64) -> bool {
        if self.is_at_rest() {
            self.settle_on_target();
            return true;
        }

        let mut remaining = dt_ms.max(0.0);
        while remaining > 0.0 {
            let h = remaining.min(substep_ms) / 1000.0;
            remaining -= substep_ms;
            for i in 0..self.position.len() {
                let (x, v) = rk4(&self.config, self.position[i], self.velocity[i], self.to[i], h);
                self.position[i] = x;
                self.velocity[i] = v;
            }
            if self.config.overshoot_clamping && self.crossed_target() {
                self.settle_on_target();
                return true;
            }
        }

        if self.is_at_rest() {
            self.settle_on_target();
            return true;
        }
        false
    }

    fn is_at_rest(&self) -> bool {
        let displacement_ok = self
            .position
            .iter()
            .zip(self.to.iter())
            .all(|(x, t)| (x - t).abs() <= self.config.rest_displacement_threshold);
        let speed_ok = self
            .velocity
            .iter()
            .all(|v| v.abs() <= self.config.rest_speed_threshold);
        displacement_ok && speed_ok
    }

    /// A component has moved past its target relative to where it started.
    fn crossed_target(&self) -> bool {
        self.position
            .iter()
            .zip(self.from.iter())
            .zip(self.to.iter())
            .any(|((x, from), to)| {
                if from < to {
                    x > to
                } else if from > to {
                    x < to
                } else {
                    false
                }
            })
    }
}

fn rk4(config: &SpringConfig, x: f64, v: f64, target: f64, h: f64) -> (f64, f64) {
    let accel =
        |x: f64, v: f64| (-config.stiffness * (x - target) - config.damping * v) / config.mass;

    let k1_x = v;
    let k1_v = accel(x, v);

    let k2_x = v + k1_v * h * 0.5;
    let k2_v = accel(x + k1_x * h * 0.5, v + k1_v * h * 0.5);

    let k3_x = v + k2_v * h * 0.5;
    let k3_v = accel(x + k2_x * h * 0.5, v + k2_v * h * 0.5);

    let k4_x = v + k3_v * h;
    let k4_v = accel(x + k3_x * h, v + k3_v * h);

    (
        x + (k1_x + 2.0 * k2_x + 2.0 * k3_x + k4_x) * h / 6.0,
        v + (k1_v + 2.0 * k2_v + 2.0 * k3_v + k4_v) * h / 6.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    const FRAME_MS: f64 = 1000.0 / 60.0;

    #[test]
    fn settles_to_target() {
        let mut spring =
            SpringState::new(SpringConfig::stiff(), smallvec![0.0], smallvec![100.0], smallvec![]);
        let mut frames = 0;
        while !spring.step(FRAME_MS, 1.0) {
            frames += 1;
            assert!(frames < 600, "spring did not settle");
        }
        assert_eq!(spring.position()[0], 100.0);
        assert_eq!(spring.velocity()[0], 0.0);
    }

    #[test]
    fn overdamped_spring_stays_stable() {
        let config = SpringConfig::new(0.3, 121.6, 50.0).with_rest_thresholds(0.3, 0.3);
        let mut spring = SpringState::new(config, smallvec![0.0], smallvec![100.0], smallvec![]);
        for _ in 0..500 {
            if spring.step(FRAME_MS, 1.0) {
                break;
            }
            let x = spring.position()[0];
            assert!(x.is_finite() && (-1.0..=101.0).contains(&x), "diverged to {x}");
        }
        assert_eq!(spring.position()[0], 100.0);
    }

    #[test]
    fn overshoot_clamping_stops_at_target() {
        let config = SpringConfig::wobbly().with_overshoot_clamping(true);
        let mut spring = SpringState::new(config, smallvec![0.0], smallvec![100.0], smallvec![]);
        for _ in 0..600 {
            let done = spring.step(FRAME_MS, 1.0);
            assert!(spring.position()[0] <= 100.0);
            if done {
                break;
            }
        }
        assert_eq!(spring.position()[0], 100.0);
    }

    #[test]
    fn initial_velocity_carries() {
        let mut spring = SpringState::new(
            SpringConfig::gentle(),
            smallvec![0.0],
            smallvec![0.0],
            smallvec![500.0],
        );
        spring.step(FRAME_MS, 1.0);
        assert!(spring.position()[0] > 0.0);
    }

    #[test]
    fn presets_and_validation() {
        assert!(SpringConfig::wobbly().is_underdamped());
        assert!(SpringConfig::default().validate().is_ok());
        assert!(SpringConfig::new(0.0, 100.0, 10.0).validate().is_err());
        assert!(SpringConfig::new(1.0, -1.0, 10.0).validate().is_err());
    }
}
