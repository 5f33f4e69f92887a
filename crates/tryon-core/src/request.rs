//! Transport-neutral description of the synthesis endpoint's multipart forms.

use crate::acquisition::SourcePhoto;
use crate::parameters::EffectiveParameters;
use crate::reference::ReferenceAsset;
use crate::types::Region;
use std::sync::Arc;

pub const REGION_TRANSFER_PATH: &str = "/transfer/region-specific";
pub const GLOBAL_TRANSFER_PATH: &str = "/transfer/global";

/// The reference asset goes into all three slots; the endpoint expects
/// every slot populated even though only the active region's is used.
const REFERENCE_SLOTS: [&str; 3] = ["ref_lip", "ref_skin", "ref_eye"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    File {
        bytes: Arc<[u8]>,
        file_name: String,
        media_type: String,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: &'static str,
    pub value: FormValue,
}

impl FormField {
    fn file(name: &'static str, bytes: Arc<[u8]>, stem: &str) -> Self {
        let (media_type, ext) = sniff(&bytes);
        Self {
            name,
            value: FormValue::File {
                bytes,
                file_name: format!("{stem}.{ext}"),
                media_type: media_type.to_string(),
            },
        }
    }

    fn text(name: &'static str, value: String) -> Self {
        Self {
            name,
            value: FormValue::Text(value),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            FormValue::Text(t) => Some(t),
            FormValue::File { .. } => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            FormValue::File { bytes, .. } => Some(bytes),
            FormValue::Text(_) => None,
        }
    }
}

/// Region-scoped transfer: one photo, one reference, one active intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    source: Arc<[u8]>,
    reference: ReferenceAsset,
    region: Region,
    parameters: EffectiveParameters,
}

impl TransferRequest {
    /// The region comes from the reference asset; intensities of every other
    /// region are forced to zero whatever `parameters` holds.
    pub fn new(photo: &SourcePhoto, reference: &ReferenceAsset, parameters: EffectiveParameters) -> Self {
        let region = reference.region();
        let intensity = parameters.get(region);
        let only = |r: Region| if r == region { intensity } else { 0.0 };
        Self {
            source: Arc::from(photo.bytes()),
            reference: reference.clone(),
            region,
            parameters: EffectiveParameters {
                lip: only(Region::Lip),
                skin: only(Region::Skin),
                eye: only(Region::Eye),
            },
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn parameters(&self) -> EffectiveParameters {
        self.parameters
    }

    pub fn reference(&self) -> &ReferenceAsset {
        &self.reference
    }

    pub fn form_fields(&self) -> Vec<FormField> {
        let reference: Arc<[u8]> = Arc::from(self.reference.payload());
        let stem = file_stem(self.reference.name());

        let mut fields = vec![FormField::file("source", Arc::clone(&self.source), "source")];
        fields.extend(
            REFERENCE_SLOTS
                .iter()
                .map(|&slot| FormField::file(slot, Arc::clone(&reference), &stem)),
        );
        fields.push(FormField::text("lip_sat", format_intensity(self.parameters.lip)));
        fields.push(FormField::text("skin_sat", format_intensity(self.parameters.skin)));
        fields.push(FormField::text("eye_sat", format_intensity(self.parameters.eye)));
        fields
    }
}

/// Whole-face transfer from a reference photo, with no region gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalTransferRequest {
    source: Arc<[u8]>,
    reference: Arc<[u8]>,
}

impl GlobalTransferRequest {
    pub fn new(photo: &SourcePhoto, reference: &SourcePhoto) -> Self {
        Self {
            source: Arc::from(photo.bytes()),
            reference: Arc::from(reference.bytes()),
        }
    }

    pub fn form_fields(&self) -> Vec<FormField> {
        vec![
            FormField::file("source", Arc::clone(&self.source), "source"),
            FormField::file("reference", Arc::clone(&self.reference), "reference"),
        ]
    }
}

/// One decimal place, e.g. `1.0`, `0.0`, `1.2`.
pub fn format_intensity(value: f32) -> String {
    format!("{value:.1}")
}

fn sniff(bytes: &[u8]) -> (&'static str, &'static str) {
    match image::guess_format(bytes) {
        Ok(format) => (
            format.to_mime_type(),
            format.extensions_str().first().copied().unwrap_or("bin"),
        ),
        Err(_) => ("application/octet-stream", "bin"),
    }
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "reference".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{ImageAcquisition, PreviewRegistry};
    use crate::testing::{png_bytes, reference_asset};

    fn field<'a>(fields: &'a [FormField], name: &str) -> &'a FormField {
        fields.iter().find(|f| f.name == name).unwrap()
    }

    #[test]
    fn test_format_intensity() {
        assert_eq!(format_intensity(1.0), "1.0");
        assert_eq!(format_intensity(0.0), "0.0");
        assert_eq!(format_intensity(1.2), "1.2");
        assert_eq!(format_intensity(2.0), "2.0");
    }

    #[test]
    fn test_region_form_duplicates_reference_and_zeroes_other_regions() {
        let acq = ImageAcquisition::new(PreviewRegistry::new());
        let photo = acq.acquire_from_file(png_bytes(4, 4, [1, 2, 3]), "image/png").unwrap();
        let ruby = reference_asset("ruby", "Ruby Red", Region::Lip, b"ruby-bytes");

        // Stale values for inactive regions must not leak into the form.
        let req = TransferRequest::new(&photo, &ruby, EffectiveParameters { lip: 1.0, skin: 0.8, eye: 1.5 });
        let fields = req.form_fields();

        let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            ["source", "ref_lip", "ref_skin", "ref_eye", "lip_sat", "skin_sat", "eye_sat"]
        );
        assert_eq!(field(&fields, "source").as_bytes(), Some(photo.bytes()));
        for slot in ["ref_lip", "ref_skin", "ref_eye"] {
            assert_eq!(field(&fields, slot).as_bytes(), Some(&b"ruby-bytes"[..]));
        }
        assert_eq!(field(&fields, "lip_sat").as_text(), Some("1.0"));
        assert_eq!(field(&fields, "skin_sat").as_text(), Some("0.0"));
        assert_eq!(field(&fields, "eye_sat").as_text(), Some("0.0"));
    }

    #[test]
    fn test_file_parts_carry_sniffed_type() {
        let acq = ImageAcquisition::new(PreviewRegistry::new());
        let photo = acq.acquire_from_file(png_bytes(4, 4, [1, 2, 3]), "image/png").unwrap();
        let asset = reference_asset("s", "Soft Glow #2", Region::Skin, b"raw");
        let fields = TransferRequest::new(&photo, &asset, EffectiveParameters { lip: 0.0, skin: 1.0, eye: 0.0 })
            .form_fields();

        match &field(&fields, "source").value {
            FormValue::File { file_name, media_type, .. } => {
                assert_eq!(file_name, "source.png");
                assert_eq!(media_type, "image/png");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &field(&fields, "ref_skin").value {
            FormValue::File { file_name, media_type, .. } => {
                assert_eq!(file_name, "Soft_Glow__2.bin");
                assert_eq!(media_type, "application/octet-stream");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_global_form() {
        let acq = ImageAcquisition::new(PreviewRegistry::new());
        let photo = acq.acquire_from_file(vec![9, 9], "image/jpeg").unwrap();
        let style = acq.acquire_from_file(vec![7, 7], "image/jpeg").unwrap();
        let fields = GlobalTransferRequest::new(&photo, &style).form_fields();
        let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["source", "reference"]);
        assert_eq!(fields[1].as_bytes(), Some(&[7u8, 7][..]));
    }
}
