//! Per-region intensity ("saturation") parameters.

use crate::types::Region;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INTENSITY_MIN: f32 = 0.0;
pub const INTENSITY_MAX: f32 = 2.0;
pub const INTENSITY_DEFAULT: f32 = 1.0;
pub const INTENSITY_STEP: f32 = 0.1;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ParameterError {
    #[error("{0} intensity is disabled while another region is active")]
    Disabled(Region),
    #[error("intensity {0} is not a number")]
    NotANumber(f32),
}

/// The intensity triple actually sent to the synthesis endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveParameters {
    pub lip: f32,
    pub skin: f32,
    pub eye: f32,
}

impl EffectiveParameters {
    pub fn get(&self, region: Region) -> f32 {
        match region {
            Region::Lip => self.lip,
            Region::Skin => self.skin,
            Region::Eye => self.eye,
        }
    }
}

/// Three intensity sliders, of which only the active region's is editable.
///
/// Disabled sliders keep their displayed value but contribute zero to
/// [`effective`](Self::effective).
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterPanel {
    lip: f32,
    skin: f32,
    eye: f32,
    active: Option<Region>,
}

impl Default for ParameterPanel {
    fn default() -> Self {
        Self {
            lip: INTENSITY_DEFAULT,
            skin: INTENSITY_DEFAULT,
            eye: INTENSITY_DEFAULT,
            active: None,
        }
    }
}

impl ParameterPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active_region(&mut self, region: Region) {
        if self.active != Some(region) {
            tracing::debug!(%region, "active intensity region changed");
        }
        self.active = Some(region);
    }

    pub fn active_region(&self) -> Option<Region> {
        self.active
    }

    pub fn is_enabled(&self, region: Region) -> bool {
        self.active == Some(region)
    }

    /// Displayed value, whether or not the slider is enabled.
    pub fn value(&self, region: Region) -> f32 {
        match region {
            Region::Lip => self.lip,
            Region::Skin => self.skin,
            Region::Eye => self.eye,
        }
    }

    /// Set the active region's intensity, clamped to [0, 2] and snapped to
    /// the 0.1 step. Returns the stored value.
    pub fn set(&mut self, region: Region, value: f32) -> Result<f32, ParameterError> {
        if !self.is_enabled(region) {
            return Err(ParameterError::Disabled(region));
        }
        if value.is_nan() {
            return Err(ParameterError::NotANumber(value));
        }
        let snapped = snap(value);
        *self.slot(region) = snapped;
        Ok(snapped)
    }

    /// Intensities with every non-active region forced to zero. With no
    /// active region all three are zero.
    pub fn effective(&self) -> EffectiveParameters {
        let pick = |region: Region| {
            if self.is_enabled(region) {
                self.value(region)
            } else {
                0.0
            }
        };
        EffectiveParameters {
            lip: pick(Region::Lip),
            skin: pick(Region::Skin),
            eye: pick(Region::Eye),
        }
    }

    fn slot(&mut self, region: Region) -> &mut f32 {
        match region {
            Region::Lip => &mut self.lip,
            Region::Skin => &mut self.skin,
            Region::Eye => &mut self.eye,
        }
    }
}

fn snap(value: f32) -> f32 {
    let clamped = value.clamp(INTENSITY_MIN, INTENSITY_MAX);
    ((clamped / INTENSITY_STEP).round() * INTENSITY_STEP).clamp(INTENSITY_MIN, INTENSITY_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_defaults() {
        let panel = ParameterPanel::new();
        for r in Region::ALL {
            assert!(approx(panel.value(r), 1.0));
            assert!(!panel.is_enabled(r));
        }
        assert_eq!(panel.effective(), EffectiveParameters { lip: 0.0, skin: 0.0, eye: 0.0 });
    }

    #[test]
    fn test_effective_zeroes_inactive_regions() {
        let mut panel = ParameterPanel::new();
        panel.set_active_region(Region::Lip);
        panel.set(Region::Lip, 1.5).unwrap();
        panel.set_active_region(Region::Skin);
        panel.set(Region::Skin, 0.8).unwrap();
        panel.set_active_region(Region::Eye);
        panel.set(Region::Eye, 1.2).unwrap();

        let eff = panel.effective();
        assert_eq!(eff.lip, 0.0);
        assert_eq!(eff.skin, 0.0);
        assert!(approx(eff.eye, 1.2));

        // Disabled sliders keep their displayed values.
        assert!(approx(panel.value(Region::Lip), 1.5));
        assert!(approx(panel.value(Region::Skin), 0.8));
    }

    #[test]
    fn test_only_active_slider_is_editable() {
        let mut panel = ParameterPanel::new();
        panel.set_active_region(Region::Eye);
        assert!(panel.is_enabled(Region::Eye));
        assert!(!panel.is_enabled(Region::Lip));
        assert_eq!(panel.set(Region::Lip, 0.5), Err(ParameterError::Disabled(Region::Lip)));
        assert!(approx(panel.value(Region::Lip), 1.0));
    }

    #[test]
    fn test_set_clamps_and_snaps() {
        let mut panel = ParameterPanel::new();
        panel.set_active_region(Region::Skin);
        assert!(approx(panel.set(Region::Skin, 5.0).unwrap(), 2.0));
        assert!(approx(panel.set(Region::Skin, -1.0).unwrap(), 0.0));
        assert!(approx(panel.set(Region::Skin, 0.84).unwrap(), 0.8));
        assert!(approx(panel.set(Region::Skin, 1.26).unwrap(), 1.3));
        assert!(panel.set(Region::Skin, f32::NAN).is_err());
    }
}
