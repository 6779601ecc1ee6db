use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::image::ImageDescriptor;

/// Timestamp layout used in failure log lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A permanently failed image acquisition, awaiting manual follow-up.
///
/// Records are only ever appended; nothing in this crate rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// 1-based position in the URL list (main-image archive only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub index: Option<usize>,
    pub detail_page_url: String,
    pub image_info: ImageDescriptor,
    pub timestamp: String,
}

impl FailureRecord {
    pub fn new(detail_page_url: &str, image: &ImageDescriptor, index: Option<usize>) -> Self {
        Self::at(detail_page_url, image, index, Local::now())
    }

    pub fn at(
        detail_page_url: &str,
        image: &ImageDescriptor,
        index: Option<usize>,
        when: DateTime<Local>,
    ) -> Self {
        Self {
            index,
            detail_page_url: detail_page_url.to_string(),
            image_info: image.clone(),
            timestamp: when.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}
