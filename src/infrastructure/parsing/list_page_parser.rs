//! Catalog search result parser

use scraper::{Html, Selector};
use url::Url;

use super::{ParsingError, ParsingResult, compile_selector, element_text};

pub struct SearchPageParser {
    base_url: Url,
    total_pages_selector: Selector,
    detail_link_selector: Selector,
}

impl SearchPageParser {
    pub fn new(base_url: &str) -> ParsingResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| ParsingError::UrlResolutionFailed {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            base_url,
            total_pages_selector: compile_selector("span#total-pageCount")?,
            detail_link_selector: compile_selector("a.openblank")?,
        })
    }

    /// Total number of result pages announced on the first page
    pub fn total_pages(&self, html: &str) -> ParsingResult<u32> {
        let document = Html::parse_document(html);
        let span = document
            .select(&self.total_pages_selector)
            .next()
            .ok_or_else(|| ParsingError::required_field_missing("total-pageCount", Some("search results")))?;

        let text = element_text(&span);
        text.parse::<u32>().map_err(|_| ParsingError::InvalidValue {
            field: "total-pageCount".to_string(),
            value: text,
        })
    }

    /// Absolute detail page URLs, in listing order
    pub fn detail_urls(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.detail_link_selector)
            .filter_map(|link| link.value().attr("href"))
            .filter_map(|href| self.base_url.join(href.trim()).ok())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://digitalarchive.npm.gov.tw";

    #[test]
    fn reads_total_page_count() {
        let parser = SearchPageParser::new(BASE).unwrap();
        let html = r#"<div>共 <span id="total-pageCount"> 412 </span> 頁</div>"#;
        assert_eq!(parser.total_pages(html), Ok(412));
    }

    #[test]
    fn missing_or_garbled_page_count_is_an_error() {
        let parser = SearchPageParser::new(BASE).unwrap();
        assert!(parser.total_pages("<div></div>").is_err());
        assert!(matches!(
            parser.total_pages(r#"<span id="total-pageCount">many</span>"#),
            Err(ParsingError::InvalidValue { .. })
        ));
    }

    #[test]
    fn resolves_detail_links() {
        let parser = SearchPageParser::new(BASE).unwrap();
        let html = r#"
            <a class="openblank" href="/Painting/Content?pid=1&Dept=P">one</a>
            <a class="other" href="/ignored">x</a>
            <a class="openblank" href="/Painting/Content?pid=2&Dept=P">two</a>"#;

        assert_eq!(
            parser.detail_urls(html),
            vec![
                "https://digitalarchive.npm.gov.tw/Painting/Content?pid=1&Dept=P",
                "https://digitalarchive.npm.gov.tw/Painting/Content?pid=2&Dept=P",
            ]
        );
    }
}
