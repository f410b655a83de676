//! Property bags handed to the renderer.
//!
//! A bag is an ordered map from property name to a number, a string or a
//! transform list. Insertion order is preserved so renderers that apply
//! properties in sequence see them the way the style computation wrote them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{MotiveError, Result};

/// One entry of a transform list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transform {
    TranslateX(f64),
    TranslateY(f64),
    Scale(f64),
    ScaleX(f64),
    ScaleY(f64),
    /// Degrees.
    Rotate(f64),
    /// Degrees.
    SkewX(f64),
    /// Degrees.
    SkewY(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
    Transform(Vec<Transform>),
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<Vec<Transform>> for PropertyValue {
    fn from(value: Vec<Transform>) -> Self {
        PropertyValue::Transform(value)
    }
}

/// Output of a style computation for one frame.
///
/// # Example
///
/// ```rust,ignore
/// PropertyBag::new()
///     .with("opacity", 0.5)
///     .with("transform", vec![Transform::TranslateX(24.0)])
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag(IndexMap<String, PropertyValue>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    /// Numeric property, if present and numeric.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(PropertyValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| MotiveError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let bag = PropertyBag::new()
            .with("width", 10.0)
            .with("backgroundColor", "red")
            .with("opacity", 1.0);
        let names: Vec<&str> = bag.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["width", "backgroundColor", "opacity"]);
    }

    #[test]
    fn serializes_to_renderer_json() {
        let bag = PropertyBag::new()
            .with("opacity", 0.5)
            .with("transform", vec![Transform::TranslateX(12.0), Transform::Rotate(45.0)]);
        assert_eq!(
            bag.to_json().unwrap(),
            r#"{"opacity":0.5,"transform":[{"translateX":12.0},{"rotate":45.0}]}"#
        );

        let back: PropertyBag = serde_json::from_str(&bag.to_json().unwrap()).unwrap();
        assert_eq!(back, bag);
    }
}
