use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a detected face, in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Fraction of the image covered by this box along each axis: (width, height).
    pub fn frame_ratios(&self, image_width: u32, image_height: u32) -> (f32, f32) {
        if image_width == 0 || image_height == 0 {
            return (0.0, 0.0);
        }
        (
            self.width / image_width as f32,
            self.height / image_height as f32,
        )
    }
}

/// Anatomical area a product category is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Lip,
    Eye,
    Skin,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Lip, Region::Skin, Region::Eye];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Lip => "lip",
            Region::Eye => "eye",
            Region::Skin => "skin",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation status of a [`SourcePhoto`](crate::acquisition::SourcePhoto).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoLifecycle {
    Unvalidated,
    Valid,
    Invalid,
}
