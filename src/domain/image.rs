use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::constants::markup::IMAGE_EXTENSION;

/// One downloadable image declared by a detail page's gallery.
///
/// Identity is `name`; it doubles as the on-disk filename stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub name: String,
    pub id: String,
    pub code: String,
}

impl ImageDescriptor {
    pub fn new(name: impl Into<String>, id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            code: code.into(),
        }
    }

    /// `<name>.jpg`, the resumability checkpoint for this image
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, IMAGE_EXTENSION)
    }
}

impl fmt::Display for ImageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id: {})", self.name, self.id)
    }
}

/// Read-only view over one fetched detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDetailPage {
    pub item_id: String,
    pub page_url: String,
    pub images: Vec<ImageDescriptor>,
    pub title: String,
}

impl ItemDetailPage {
    /// The first gallery image, used by the main-image archive
    pub fn main_image(&self) -> Option<&ImageDescriptor> {
        self.images.first()
    }
}

/// Echo parameters issued by a successful CAPTCHA validation.
///
/// The server ties them to the session that validated, so they are only
/// usable for an immediate download over that same session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadParams {
    #[serde(rename = "ImageId", deserialize_with = "lenient_string")]
    pub image_id: String,
    #[serde(rename = "Dep", deserialize_with = "lenient_string")]
    pub dep: String,
    #[serde(rename = "Cid", deserialize_with = "lenient_string")]
    pub cid: String,
    #[serde(rename = "Captcha", deserialize_with = "lenient_string")]
    pub captcha: String,
    #[serde(rename = "ImageCode", deserialize_with = "lenient_string")]
    pub image_code: String,
}

/// Accepts either a JSON string or a JSON number.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_name_uses_jpg_extension() {
        let descriptor = ImageDescriptor::new("img1", "1", "AB");
        assert_eq!(descriptor.file_name(), "img1.jpg");
    }

    #[test]
    fn download_params_accept_numbers_and_strings() {
        let params: DownloadParams = serde_json::from_value(json!({
            "result": true,
            "ImageId": 4711,
            "Dep": "U",
            "Cid": "2903",
            "Captcha": "AB12",
            "ImageCode": "xyz"
        }))
        .unwrap();

        assert_eq!(params.image_id, "4711");
        assert_eq!(params.cid, "2903");
        assert_eq!(params.captcha, "AB12");
    }

    #[test]
    fn download_params_reject_missing_fields() {
        let result = serde_json::from_value::<DownloadParams>(json!({
            "result": true,
            "ImageId": "1"
        }));
        assert!(result.is_err());
    }
}
