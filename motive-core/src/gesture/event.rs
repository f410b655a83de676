//! Gesture events as delivered by the platform.

use serde::{Deserialize, Serialize};

use crate::animation::Vec2;

/// Phase of a platform gesture event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    /// First pointer went down.
    Start,
    /// Pointers moved or changed count.
    Update,
    /// Last pointer lifted.
    End,
    /// The platform took the touch sequence away.
    Cancel,
}

/// One discrete event of a touch sequence.
///
/// `translation`, `scale` and `rotation` are cumulative since the sequence
/// started. `rotation` is in radians.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureEvent {
    pub phase: EventPhase,
    pub translation: Vec2,
    pub velocity: Vec2,
    pub focal: Vec2,
    pub scale: f64,
    pub rotation: f64,
    pub number_of_pointers: u32,
    pub timestamp: f64,
}

impl GestureEvent {
    /// A single-pointer event at rest with no translation.
    pub fn new(phase: EventPhase, timestamp: f64) -> Self {
        Self {
            phase,
            translation: Vec2::ZERO,
            velocity: Vec2::ZERO,
            focal: Vec2::ZERO,
            scale: 1.0,
            rotation: 0.0,
            number_of_pointers: if matches!(phase, EventPhase::End | EventPhase::Cancel) {
                0
            } else {
                1
            },
            timestamp,
        }
    }

    pub fn start(timestamp: f64) -> Self {
        Self::new(EventPhase::Start, timestamp)
    }

    pub fn update(timestamp: f64) -> Self {
        Self::new(EventPhase::Update, timestamp)
    }

    pub fn end(timestamp: f64) -> Self {
        Self::new(EventPhase::End, timestamp)
    }

    pub fn cancel(timestamp: f64) -> Self {
        Self::new(EventPhase::Cancel, timestamp)
    }

    pub fn with_translation(mut self, x: f64, y: f64) -> Self {
        self.translation = Vec2::new(x, y);
        self
    }

    pub fn with_velocity(mut self, x: f64, y: f64) -> Self {
        self.velocity = Vec2::new(x, y);
        self
    }

    pub fn with_focal(mut self, x: f64, y: f64) -> Self {
        self.focal = Vec2::new(x, y);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_pointers(mut self, count: u32) -> Self {
        self.number_of_pointers = count;
        self
    }

    /// Whether a pointer is still down after this event.
    pub fn pointer_down(&self) -> bool {
        matches!(self.phase, EventPhase::Start | EventPhase::Update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_platform_json() {
        let json = r#"{
            "phase": "update",
            "translation": {"x": 12.0, "y": -4.0},
            "velocity": {"x": 300.0, "y": 0.0},
            "focal": {"x": 100.0, "y": 200.0},
            "scale": 1.0,
            "rotation": 0.0,
            "numberOfPointers": 1,
            "timestamp": 1032.5
        }"#;
        let event: GestureEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.phase, EventPhase::Update);
        assert_eq!(event.translation, Vec2::new(12.0, -4.0));
        assert_eq!(event.number_of_pointers, 1);
        assert!(event.pointer_down());
    }
}
