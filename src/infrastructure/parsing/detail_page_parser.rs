//! Detail page parser
//!
//! Extracts the item id (from the `GetJson?cid=` script reference), the
//! ordered gallery of image descriptors, and the page title.

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::{ParsingError, ParsingResult, compile_selector, element_text};
use crate::domain::constants::markup;
use crate::domain::{ImageDescriptor, ItemDetailPage};
use crate::infrastructure::storage::is_safe_file_stem;

pub struct DetailPageParser {
    item_id_pattern: Regex,
    gallery_image_selector: Selector,
    title_selector: Selector,
}

impl DetailPageParser {
    pub fn new() -> ParsingResult<Self> {
        let item_id_pattern = Regex::new(markup::ITEM_ID_PATTERN)
            .map_err(|e| ParsingError::invalid_selector(markup::ITEM_ID_PATTERN, e))?;

        Ok(Self {
            item_id_pattern,
            gallery_image_selector: compile_selector(markup::GALLERY_IMAGE_SELECTOR)?,
            title_selector: compile_selector("title")?,
        })
    }

    /// Item id embedded in the page's script references
    pub fn extract_item_id(&self, html: &str) -> Option<String> {
        self.item_id_pattern
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Gallery images in page order; tags missing any attribute, or whose name
    /// is not a plain file stem, are skipped
    pub fn extract_images(&self, document: &Html) -> Vec<ImageDescriptor> {
        document
            .select(&self.gallery_image_selector)
            .enumerate()
            .filter_map(|(position, tag)| {
                let element = tag.value();
                match (
                    element.attr(markup::IMAGE_NAME_ATTR),
                    element.attr(markup::IMAGE_ID_ATTR),
                    element.attr(markup::IMAGE_CODE_ATTR),
                ) {
                    (Some(name), Some(id), Some(code)) if !name.trim().is_empty() => {
                        let name = name.trim();
                        if is_safe_file_stem(name) {
                            Some(ImageDescriptor::new(name, id.trim(), code.trim()))
                        } else {
                            warn!("Skipping gallery image #{} with unusable name {:?}", position, name);
                            None
                        }
                    }
                    _ => {
                        warn!("Skipping gallery image #{} with incomplete attributes", position);
                        None
                    }
                }
            })
            .collect()
    }

    pub fn extract_title(&self, document: &Html) -> Option<String> {
        document
            .select(&self.title_selector)
            .next()
            .map(|title| element_text(&title))
            .filter(|title| !title.is_empty())
    }

    /// Parse a detail page; a missing item id or empty gallery is structural
    pub fn parse(&self, html: &str, page_url: &str) -> ParsingResult<ItemDetailPage> {
        let item_id = self
            .extract_item_id(html)
            .ok_or_else(|| ParsingError::required_field_missing("item_id", Some(page_url)))?;

        let document = Html::parse_document(html);
        let images = self.extract_images(&document);
        if images.is_empty() {
            return Err(ParsingError::NoImagesFound {
                url: page_url.to_string(),
            });
        }

        let title = self.extract_title(&document).unwrap_or_else(|| {
            warn!("No <title> on {}, falling back to item id", page_url);
            format!("item_{item_id}")
        });

        debug!("Parsed item {} ({} images) from {}", item_id, images.len(), page_url);

        Ok(ItemDetailPage {
            item_id,
            page_url: page_url.to_string(),
            images,
            title,
        })
    }
}
