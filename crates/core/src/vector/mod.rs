//! Vector features: geometry plus attributes
//!
//! Stream networks and basin polygons enter the pipeline as
//! `FeatureCollection`s. Features are never mutated by analysis passes;
//! annotation (basin scoring) produces new records instead.

use crate::error::{Error, Result};
use geo::BoundingRect;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the attribute, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Numeric attribute, or an error naming the missing key
    pub fn require_f64(&self, key: &str) -> Result<f64> {
        self.properties
            .get(key)
            .and_then(AttributeValue::as_f64)
            .ok_or_else(|| Error::MissingAttribute(key.to_string()))
    }

    /// Numeric attribute with a default for absent or non-numeric values
    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.properties
            .get(key)
            .and_then(AttributeValue::as_f64)
            .unwrap_or(default)
    }

    /// Axis-aligned bounds of the geometry (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let geom = self.geometry.as_ref()?;
        let rect = geom.bounding_rect()?;
        Some((rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Keep only features whose bounds intersect the given box.
    ///
    /// Features without geometry are dropped.
    pub fn filter_bounds(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let features = self
            .features
            .iter()
            .filter(|f| {
                f.bounds().is_some_and(|(fx0, fy0, fx1, fy1)| {
                    fx0 <= max_x && fx1 >= min_x && fy0 <= max_y && fy1 >= min_y
                })
            })
            .cloned()
            .collect();
        Self { features }
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}
