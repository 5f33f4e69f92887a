//! Product category → application region.

use crate::types::Region;

const CATEGORY_REGIONS: [(&str, Region); 7] = [
    ("lipstick", Region::Lip),
    ("eyeshadow", Region::Eye),
    ("mascara", Region::Eye),
    ("eyeliner", Region::Eye),
    ("foundation", Region::Skin),
    ("blush", Region::Skin),
    ("concealer", Region::Skin),
];

/// Classify a product category label into the region it is applied to.
///
/// Matching is exact and ASCII case-insensitive. Unknown labels fall back to
/// [`Region::Skin`].
pub fn classify(label: &str) -> Region {
    CATEGORY_REGIONS
        .iter()
        .find(|(category, _)| category.eq_ignore_ascii_case(label))
        .map(|&(_, region)| region)
        .unwrap_or(Region::Skin)
}

impl Region {
    /// Region for an optional category; a missing category is skin.
    pub fn from_category(category: Option<&str>) -> Region {
        category.map(classify).unwrap_or(Region::Skin)
    }
}
