//! Animatable value types
//!
//! Animations run on flat vectors of `f64` components. A cell type opts in by
//! converting to and from that representation, which lets one driver animate
//! scalars, points and colors alike.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Component vector of an animatable value.
pub type Components = SmallVec<[f64; 4]>;

/// A value that animation primitives can drive.
pub trait Animatable: Clone + PartialEq + Send + Sync + 'static {
    /// Split the value into its numeric components.
    fn to_components(&self) -> Components;

    /// Rebuild a value from components produced by [`Animatable::to_components`].
    /// Missing components read as zero.
    fn from_components(components: &[f64]) -> Self;
}

/// Linearly interpolate two component vectors by `t`.
pub fn lerp_components(from: &[f64], to: &[f64], t: f64) -> Components {
    from.iter()
        .zip(to.iter())
        .map(|(a, b)| a + (b - a) * t)
        .collect()
}

fn component(components: &[f64], index: usize) -> f64 {
    components.get(index).copied().unwrap_or(0.0)
}

impl Animatable for f64 {
    fn to_components(&self) -> Components {
        smallvec::smallvec![*self]
    }

    fn from_components(components: &[f64]) -> Self {
        component(components, 0)
    }
}

impl Animatable for f32 {
    fn to_components(&self) -> Components {
        smallvec::smallvec![f64::from(*self)]
    }

    fn from_components(components: &[f64]) -> Self {
        component(components, 0) as f32
    }
}

/// A 2D vector: translations, velocities, focal points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Animatable for Vec2 {
    fn to_components(&self) -> Components {
        smallvec::smallvec![self.x, self.y]
    }

    fn from_components(components: &[f64]) -> Self {
        Self::new(component(components, 0), component(components, 1))
    }
}

/// An RGBA color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// CSS-style `rgba(...)` string with 8-bit channels.
    pub fn to_css(&self) -> String {
        let channel = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "rgba({}, {}, {}, {})",
            channel(self.r),
            channel(self.g),
            channel(self.b),
            (self.a.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
        )
    }
}

impl Animatable for Rgba {
    fn to_components(&self) -> Components {
        smallvec::smallvec![self.r, self.g, self.b, self.a]
    }

    fn from_components(components: &[f64]) -> Self {
        Self::new(
            component(components, 0),
            component(components, 1),
            component(components, 2),
            component(components, 3),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_is_component_wise() {
        let from = Vec2::new(0.0, 10.0).to_components();
        let to = Vec2::new(10.0, 20.0).to_components();
        let mid = Vec2::from_components(&lerp_components(&from, &to, 0.5));
        assert_eq!(mid, Vec2::new(5.0, 15.0));
    }

    #[test]
    fn missing_components_read_as_zero() {
        assert_eq!(Rgba::from_components(&[1.0]), Rgba::new(1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn css_color_string() {
        assert_eq!(Rgba::new(1.0, 0.5, 0.0, 0.25).to_css(), "rgba(255, 128, 0, 0.25)");
    }
}
