//! Easing curves for timing animations.
//!
//! An easing maps linear progress in `0.0..=1.0` to eased progress. Bezier
//! curves may overshoot outside that range.

use serde::{Deserialize, Serialize};

use crate::error::{MotiveError, Result};

/// Where the jump happens in a stepped easing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPosition {
    /// Jump at the start of each interval.
    Start,
    /// Jump at the end of each interval.
    #[default]
    End,
}

/// Easing function for timing animations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Easing {
    Linear,

    /// CSS `ease`, `cubic-bezier(0.25, 0.1, 0.25, 1.0)`.
    Ease,
    /// CSS `ease-in`, `cubic-bezier(0.42, 0, 1, 1)`.
    EaseIn,
    /// CSS `ease-out`, `cubic-bezier(0, 0, 0.58, 1)`.
    EaseOut,
    /// CSS `ease-in-out`, `cubic-bezier(0.42, 0, 0.58, 1)`.
    EaseInOut,

    InQuad,
    OutQuad,
    #[default]
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InOutSine,
    OutExpo,

    /// Custom cubic bezier. `x1` and `x2` must lie in `[0, 1]`.
    Bezier { x1: f64, y1: f64, x2: f64, y2: f64 },

    /// Discrete jumps. `count` must be at least 1.
    Steps { count: u32, position: StepPosition },
}

impl Easing {
    /// Build a validated bezier easing.
    pub fn bezier(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        if !((0.0..=1.0).contains(&x1) && (0.0..=1.0).contains(&x2)) {
            return Err(MotiveError::invalid(
                "easing",
                format!("bezier x values must be in [0, 1], got {x1} and {x2}"),
            ));
        }
        if !(y1.is_finite() && y2.is_finite()) {
            return Err(MotiveError::invalid("easing", "bezier y values must be finite"));
        }
        Ok(Self::Bezier { x1, y1, x2, y2 })
    }

    /// Build a validated stepped easing.
    pub fn steps(count: u32, position: StepPosition) -> Result<Self> {
        if count == 0 {
            return Err(MotiveError::invalid("easing", "steps must be at least 1"));
        }
        Ok(Self::Steps { count, position })
    }

    /// Re-check parameters of a value built without the constructors, e.g.
    /// one deserialized from a config file.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Bezier { x1, y1, x2, y2 } => Self::bezier(x1, y1, x2, y2).map(|_| ()),
            Self::Steps { count, position } => Self::steps(count, position).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Evaluate the easing at progress `t` (clamped to `0.0..=1.0`).
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Self::Linear => t,
            Self::Ease => cubic_bezier(0.25, 0.1, 0.25, 1.0, t),
            Self::EaseIn => cubic_bezier(0.42, 0.0, 1.0, 1.0, t),
            Self::EaseOut => cubic_bezier(0.0, 0.0, 0.58, 1.0, t),
            Self::EaseInOut => cubic_bezier(0.42, 0.0, 0.58, 1.0, t),
            Self::InQuad => t * t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Self::InOutSine => -((std::f64::consts::PI * t).cos() - 1.0) / 2.0,
            Self::OutExpo => {
                if t >= 1.0 {
                    1.0
                } else {
                    1.0 - 2f64.powf(-10.0 * t)
                }
            }
            Self::Bezier { x1, y1, x2, y2 } => cubic_bezier(x1, y1, x2, y2, t),
            Self::Steps { count, position } => stepped(count, position, t),
        }
    }
}

/// Evaluate a cubic bezier timing curve at progress `x`.
///
/// Newton-Raphson finds the curve parameter whose x coordinate matches the
/// progress, then the y coordinate at that parameter is returned.
fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let t = solve_bezier_x(x1, x2, x);
    bezier_coord(y1, y2, t)
}

fn solve_bezier_x(x1: f64, x2: f64, target_x: f64) -> f64 {
    let mut t = target_x;
    for _ in 0..8 {
        let x = bezier_coord(x1, x2, t) - target_x;
        if x.abs() < 1e-7 {
            return t;
        }
        let dx = bezier_derivative(x1, x2, t);
        if dx.abs() < 1e-7 {
            break;
        }
        t = (t - x / dx).clamp(0.0, 1.0);
    }

    // Newton stalled on a flat stretch; fall back to bisection.
    let (mut lo, mut hi) = (0.0, 1.0);
    t = target_x;
    for _ in 0..32 {
        let x = bezier_coord(x1, x2, t);
        if (x - target_x).abs() < 1e-7 {
            break;
        }
        if x < target_x {
            lo = t;
        } else {
            hi = t;
        }
        t = (lo + hi) / 2.0;
    }
    t
}

/// `3(1-t)^2 t p1 + 3(1-t) t^2 p2 + t^3`
#[inline]
fn bezier_coord(p1: f64, p2: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * t * p1 + 3.0 * mt * t * t * p2 + t * t * t
}

#[inline]
fn bezier_derivative(p1: f64, p2: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * p1 + 6.0 * mt * t * (p2 - p1) + 3.0 * t * t * (1.0 - p2)
}

fn stepped(count: u32, position: StepPosition, t: f64) -> f64 {
    let steps = f64::from(count.max(1));
    match position {
        StepPosition::Start => ((t * steps).ceil() / steps).min(1.0),
        StepPosition::End => {
            if t >= 1.0 {
                1.0
            } else {
                (t * steps).floor() / steps
            }
        }
    }
}
