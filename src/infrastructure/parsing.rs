//! HTML parsing infrastructure
//!
//! Stateless tree-to-record conversions for the three page types the archiver
//! reads: catalog search results, item detail pages (gallery), and item detail
//! pages (metadata sections).

pub mod detail_page_parser;
pub mod error;
pub mod list_page_parser;
pub mod metadata_parser;

pub use detail_page_parser::DetailPageParser;
pub use error::{ParsingError, ParsingResult};
pub use list_page_parser::SearchPageParser;
pub use metadata_parser::MetadataParser;

use scraper::{ElementRef, Selector};

/// Compile a static selector, mapping failures into [`ParsingError`]
pub(crate) fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

/// Whitespace-trimmed text of every descendant, joined without separator
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("")
}

/// Whitespace-trimmed text of every descendant, one fragment per line
pub(crate) fn element_lines(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
