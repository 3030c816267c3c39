//! Style oracle interface
//!
//! The stylesheet engine lives outside this crate. Storage only needs to ask whether an
//! element is styled at a level of detail and to read three declarations: `clip`,
//! `skip` and `size`.

use crate::{Element, LodRange};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const CLIP_KEY: &str = "clip";
pub const SKIP_KEY: &str = "skip";
pub const SIZE_KEY: &str = "size";

/// Answers style queries for an element at a level of detail
pub trait StyleOracle: Send + Sync {
    /// Whether any style rule matches the element at `lod`
    fn has_style(&self, element: &Element, lod: u8) -> bool;

    /// Declarations that apply to the element at `lod`
    fn for_element(&self, element: &Element, lod: u8) -> Style;
}

/// Resolved style declarations for one element at one level of detail
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Style {
    declarations: BTreeMap<String, String>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper to add a declaration
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.declarations.insert(key.into(), value.into());
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.declarations.contains_key(key)
    }

    pub fn has_value(&self, key: &str, value: &str) -> bool {
        self.get_string(key) == Some(value)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.declarations.get(key).map(String::as_str)
    }

    /// Numeric value of a declaration; a trailing `%` divides by 100
    pub fn get_value(&self, key: &str) -> Option<f64> {
        let raw = self.get_string(key)?.trim();
        match raw.strip_suffix('%') {
            Some(percent) => percent.trim().parse::<f64>().ok().map(|v| v / 100.0),
            None => raw.parse::<f64>().ok(),
        }
    }

    /// `clip: true`
    pub fn clip(&self) -> bool {
        self.has_value(CLIP_KEY, "true")
    }

    /// `skip: true`
    pub fn skip(&self) -> bool {
        self.has_value(SKIP_KEY, "true")
    }

    /// Minimum element-to-tile width ratio, if declared
    pub fn size(&self) -> Option<f64> {
        self.get_value(SIZE_KEY)
    }
}

/// Oracle that applies one style to every element inside a LOD range
///
/// Useful for bulk imports where the stylesheet is not involved.
#[derive(Clone, Debug)]
pub struct FixedStyleOracle {
    lods: LodRange,
    style: Style,
}

impl FixedStyleOracle {
    pub fn new(lods: LodRange, style: Style) -> Self {
        Self { lods, style }
    }
}

impl StyleOracle for FixedStyleOracle {
    fn has_style(&self, _element: &Element, lod: u8) -> bool {
        self.lods.contains(lod)
    }

    fn for_element(&self, _element: &Element, _lod: u8) -> Style {
        self.style.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, Node, Tags};

    #[test]
    fn test_style_declarations() {
        let style = Style::new()
            .with(CLIP_KEY, "true")
            .with(SIZE_KEY, "25%")
            .with("color", "red");

        assert!(style.clip());
        assert!(!style.skip());
        assert_eq!(style.size(), Some(0.25));
        assert!(style.has("color"));
        assert!(style.has_value("color", "red"));
        assert!(!style.has_value("color", "blue"));
        assert_eq!(style.get_value("color"), None);
    }

    #[test]
    fn test_plain_number_size() {
        let style = Style::new().with(SIZE_KEY, "0.1");
        assert_eq!(style.size(), Some(0.1));
    }

    #[test]
    fn test_fixed_oracle_respects_lod_range() {
        let oracle = FixedStyleOracle::new(LodRange::new(2, 4).unwrap(), Style::new());
        let node = Element::from(Node::new(1, Tags::new(), Coordinate::new(1.0, 1.0)));

        assert!(!oracle.has_style(&node, 1));
        assert!(oracle.has_style(&node, 3));
        assert!(!oracle.has_style(&node, 5));
    }
}
