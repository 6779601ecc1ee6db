//! Artifact metadata parser
//!
//! Section containers are `div#details-N`; the layout of each is fixed per
//! section (see [`SectionKind::layout`]). A missing container is recorded as
//! [`MetadataSection::Missing`], a container without a table as an empty
//! section.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{ParsingError, ParsingResult, compile_selector, element_lines, element_text};
use crate::domain::constants::markup;
use crate::domain::metadata::{
    ConservationInfo, ConservationLink, InscriptionRow, KeyValueEntry, SectionKind, SectionLayout,
    TableRow,
};
use crate::domain::{ArtifactMetadata, MetadataSection};

pub struct MetadataParser {
    item_id_pattern: Regex,
    detail_url_pattern: Regex,
    title: Selector,
    table: Selector,
    row: Selector,
    th: Selector,
    td: Selector,
    seal_table: Selector,
    nav_info: Selector,
    project_link: Selector,
}

impl MetadataParser {
    pub fn new() -> ParsingResult<Self> {
        let item_id_pattern = Regex::new(markup::ITEM_ID_PATTERN)
            .map_err(|e| ParsingError::invalid_selector(markup::ITEM_ID_PATTERN, e))?;
        let detail_url_pattern = Regex::new(r"Detail/([^/?#]+)")
            .map_err(|e| ParsingError::invalid_selector("Detail/<id>", e))?;

        Ok(Self {
            item_id_pattern,
            detail_url_pattern,
            title: compile_selector("div.details-title")?,
            table: compile_selector("table")?,
            row: compile_selector("tr")?,
            th: compile_selector("th")?,
            td: compile_selector("td")?,
            seal_table: compile_selector("table.table-details2")?,
            nav_info: compile_selector("div.nav-info")?,
            project_link: compile_selector("a.btn-project2")?,
        })
    }

    /// Numeric id from a `.../Detail/<id>` URL, if the URL has that shape
    pub fn id_from_url(&self, url: &str) -> Option<String> {
        self.detail_url_pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn parse(&self, html: &str, url: &str) -> ParsingResult<ArtifactMetadata> {
        let unique_id = self
            .item_id_pattern
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .or_else(|| self.id_from_url(url))
            .ok_or_else(|| ParsingError::required_field_missing("UniqueID", Some(url)))?;

        let document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .next()
            .map(|div| element_text(&div))
            .unwrap_or_else(|| ArtifactMetadata::MISSING_TITLE.to_string());

        let mut sections = Vec::with_capacity(SectionKind::ALL.len());
        for kind in SectionKind::ALL {
            let selector = compile_selector(&format!("div#{}", kind.container_id()))?;
            let section = match document.select(&selector).next() {
                Some(container) => self.parse_section(kind.layout(), container),
                None => MetadataSection::Missing,
            };
            sections.push((kind, section));
        }

        Ok(ArtifactMetadata {
            unique_id,
            url: url.to_string(),
            title,
            sections,
        })
    }

    fn parse_section(&self, layout: SectionLayout, container: ElementRef<'_>) -> MetadataSection {
        let table = container.select(&self.table).next();
        match layout {
            SectionLayout::KeyValueTable => {
                MetadataSection::KeyValue(table.map(|t| self.key_value_table(t)).unwrap_or_default())
            }
            SectionLayout::HeaderRowTable => {
                MetadataSection::Rows(table.map(|t| self.header_row_table(t)).unwrap_or_default())
            }
            SectionLayout::InscriptionTable => {
                MetadataSection::Inscriptions(table.map(|t| self.inscription_table(t)).unwrap_or_default())
            }
            SectionLayout::ConservationBlock => MetadataSection::Conservation(self.conservation(container)),
        }
    }

    /// `th`/`td` or `td`/`td` rows; repeated keys accumulate
    fn key_value_table(&self, table: ElementRef<'_>) -> Vec<KeyValueEntry> {
        let mut entries: Vec<KeyValueEntry> = Vec::new();

        for row in table.select(&self.row) {
            let cells: Vec<_> = row.select(&self.td).collect();
            let (key_cell, value_cell) = match row.select(&self.th).next() {
                Some(th) => (Some(th), cells.first().copied()),
                None => (cells.first().copied(), cells.get(1).copied()),
            };

            let (Some(key_cell), Some(value_cell)) = (key_cell, value_cell) else {
                continue;
            };

            let key = element_text(&key_cell);
            let value = element_lines(&value_cell);
            match entries.iter_mut().find(|entry| entry.key == key) {
                Some(entry) => entry.values.push(value),
                None => entries.push(KeyValueEntry { key, values: vec![value] }),
            }
        }

        entries
    }

    /// Header cells from every `th`; body rows kept only when the cell count matches
    fn header_row_table(&self, table: ElementRef<'_>) -> Vec<TableRow> {
        let headers: Vec<String> = table.select(&self.th).map(|th| element_text(&th)).collect();
        if headers.is_empty() {
            return Vec::new();
        }

        table
            .select(&self.row)
            .filter_map(|row| {
                let cells: Vec<_> = row.select(&self.td).collect();
                (!cells.is_empty() && cells.len() == headers.len()).then(|| TableRow {
                    cells: headers
                        .iter()
                        .cloned()
                        .zip(cells.iter().map(element_lines))
                        .collect(),
                })
            })
            .collect()
    }

    /// Inscription rows, each optionally followed by a row holding a seal table
    fn inscription_table(&self, table: ElementRef<'_>) -> Vec<InscriptionRow> {
        let Some(header_row) = table.select(&self.row).next() else {
            return Vec::new();
        };
        let headers: Vec<String> = header_row.select(&self.th).map(|th| element_text(&th)).collect();
        if headers.is_empty() {
            return Vec::new();
        }

        let rows: Vec<ElementRef<'_>> = table.select(&self.row).collect();
        let mut inscriptions = Vec::new();
        let mut i = 0;
        while i < rows.len() {
            let row = rows[i];
            if row.select(&self.th).next().is_some() || !owned_by(row, table) {
                i += 1;
                continue;
            }

            let cells: Vec<ElementRef<'_>> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|child| child.value().name() == "td")
                .collect();

            if cells.len() == headers.len() {
                let mut inscription = InscriptionRow {
                    cells: headers
                        .iter()
                        .cloned()
                        .zip(cells.iter().map(element_lines))
                        .collect(),
                    seals: None,
                };

                if let Some(seal_table) = rows
                    .get(i + 1)
                    .and_then(|next| next.select(&self.seal_table).next())
                {
                    inscription.seals = Some(self.header_row_table(seal_table));
                    i += 1;
                }
                inscriptions.push(inscription);
            }
            i += 1;
        }

        inscriptions
    }

    fn conservation(&self, container: ElementRef<'_>) -> ConservationInfo {
        ConservationInfo {
            description: container.select(&self.nav_info).next().map(|div| element_text(&div)),
            links: container
                .select(&self.project_link)
                .map(|a| ConservationLink {
                    text: element_text(&a),
                    onclick: a.value().attr("onclick").map(ToString::to_string),
                })
                .collect(),
        }
    }
}

/// Whether `table` is the nearest enclosing table of `row`
fn owned_by(row: ElementRef<'_>, table: ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "table")
        .is_some_and(|nearest| nearest.id() == table.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><script src="/x/GetJson?cid=777"></script></head><body>
      <div class="details-title"> 谿山行旅圖 </div>
      <div id="details-1"><table>
        <tr><th>品名</th><td>谿山行旅圖</td></tr>
        <tr><th>作者</th><td>范寬</td></tr>
        <tr><th>作者</th><td>佚名<br>傳</td></tr>
      </table></div>
      <div id="details-2"><table>
        <tr><th>類別</th><th>尺寸</th></tr>
        <tr><td>本幅</td><td>206.3x103.3</td></tr>
        <tr><td>only one</td></tr>
      </table></div>
      <div id="details-4"><table><tbody>
        <tr><th>位置</th><th>作者</th><th>內容</th></tr>
        <tr><td>本幅</td><td>董其昌</td><td>北宋范中立谿山行旅圖</td></tr>
        <tr><td colspan="3"><table class="table-details2">
          <tr><th>印記</th><th>位置</th></tr>
          <tr><td>董其昌印</td><td>左上</td></tr>
        </table></td></tr>
        <tr><td>裱邊</td><td>乾隆</td><td>御題</td></tr>
      </tbody></table></div>
      <div id="details-9">
        <div class="nav-info"> 修復紀錄 </div>
        <a class="btn-project2" onclick="open(1)">報告</a>
      </div>
    </body></html>"#;

    fn parse() -> ArtifactMetadata {
        MetadataParser::new()
            .unwrap()
            .parse(PAGE, "https://digitalarchive.npm.gov.tw/Painting/Detail/777?dept=P")
            .unwrap()
    }

    #[test]
    fn title_and_id() {
        let metadata = parse();
        assert_eq!(metadata.unique_id, "777");
        assert_eq!(metadata.title, "谿山行旅圖");
    }

    #[test]
    fn key_value_sections_merge_repeated_keys() {
        let metadata = parse();
        let MetadataSection::KeyValue(entries) = metadata.section(SectionKind::BasicInfo).unwrap() else {
            panic!("expected key/value section");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].values, vec!["范寬".to_string(), "佚名\n傳".to_string()]);
    }

    #[test]
    fn header_row_tables_drop_ragged_rows() {
        let metadata = parse();
        let MetadataSection::Rows(rows) = metadata.section(SectionKind::Dimensions).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells[1], ("尺寸".to_string(), "206.3x103.3".to_string()));
    }

    #[test]
    fn inscriptions_carry_their_seals() {
        let metadata = parse();
        let MetadataSection::Inscriptions(rows) = metadata.section(SectionKind::Inscriptions).unwrap() else {
            panic!("expected inscriptions");
        };
        assert_eq!(rows.len(), 2);
        let seals = rows[0].seals.as_ref().unwrap();
        assert_eq!(seals[0].cells[0].1, "董其昌印");
        assert!(rows[1].seals.is_none());
    }

    #[test]
    fn missing_and_conservation_sections() {
        let metadata = parse();
        assert_eq!(metadata.section(SectionKind::Material), Some(&MetadataSection::Missing));

        let MetadataSection::Conservation(info) = metadata.section(SectionKind::Conservation).unwrap() else {
            panic!("expected conservation block");
        };
        assert_eq!(info.description.as_deref(), Some("修復紀錄"));
        assert_eq!(info.links[0].onclick.as_deref(), Some("open(1)"));
    }

    #[test]
    fn id_falls_back_to_url() {
        let parser = MetadataParser::new().unwrap();
        let metadata = parser.parse("<html></html>", "https://x/Painting/Detail/31?l=1").unwrap();
        assert_eq!(metadata.unique_id, "31");
        assert_eq!(metadata.title, "N/A");
        assert!(parser.parse("<html></html>", "https://x/Painting/Content").is_err());
    }
}
