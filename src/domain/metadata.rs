//! Scraped artifact metadata
//!
//! Each detail page carries up to nine `details-N` sections. Rather than
//! untyped maps, every section is a tagged variant chosen by its layout, and
//! serializes back into the same JSON shape the catalog uses (labels as keys).

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Known detail-page sections, in page order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    BasicInfo,
    Dimensions,
    Material,
    Inscriptions,
    Seals,
    Subjects,
    Techniques,
    References,
    Conservation,
}

/// How a section's markup is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLayout {
    KeyValueTable,
    HeaderRowTable,
    InscriptionTable,
    ConservationBlock,
}

impl SectionKind {
    pub const ALL: [Self; 9] = [
        Self::BasicInfo,
        Self::Dimensions,
        Self::Material,
        Self::Inscriptions,
        Self::Seals,
        Self::Subjects,
        Self::Techniques,
        Self::References,
        Self::Conservation,
    ];

    /// Column / JSON key, as labelled on the site
    pub const fn label(self) -> &'static str {
        match self {
            Self::BasicInfo => "基本資料",
            Self::Dimensions => "典藏尺寸",
            Self::Material => "質地",
            Self::Inscriptions => "題跋資料",
            Self::Seals => "印記資料",
            Self::Subjects => "主題",
            Self::Techniques => "技法",
            Self::References => "參考資料",
            Self::Conservation => "保存維護",
        }
    }

    /// `id` of the `div` wrapping the section
    pub const fn container_id(self) -> &'static str {
        match self {
            Self::BasicInfo => "details-1",
            Self::Dimensions => "details-2",
            Self::Material => "details-3",
            Self::Inscriptions => "details-4",
            Self::Seals => "details-5",
            Self::Subjects => "details-6",
            Self::Techniques => "details-7",
            Self::References => "details-8",
            Self::Conservation => "details-9",
        }
    }

    pub const fn layout(self) -> SectionLayout {
        match self {
            Self::BasicInfo | Self::References => SectionLayout::KeyValueTable,
            Self::Inscriptions => SectionLayout::InscriptionTable,
            Self::Conservation => SectionLayout::ConservationBlock,
            Self::Dimensions | Self::Material | Self::Seals | Self::Subjects | Self::Techniques => {
                SectionLayout::HeaderRowTable
            }
        }
    }
}

/// A key with one or more values; repeated keys in a table collect here
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueEntry {
    pub key: String,
    pub values: Vec<String>,
}

/// One body row of a header-row table, as (header, cell text) pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<(String, String)>,
}

/// An inscription row, optionally followed by the seals stamped on it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InscriptionRow {
    pub cells: Vec<(String, String)>,
    pub seals: Option<Vec<TableRow>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConservationLink {
    pub text: String,
    pub onclick: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConservationInfo {
    pub description: Option<String>,
    pub links: Vec<ConservationLink>,
}

/// Parsed content of one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSection {
    KeyValue(Vec<KeyValueEntry>),
    Rows(Vec<TableRow>),
    Inscriptions(Vec<InscriptionRow>),
    Conservation(ConservationInfo),
    /// The page has no container for this section
    Missing,
}

impl MetadataSection {
    /// Empty sections become blank CSV cells
    pub fn is_empty(&self) -> bool {
        match self {
            Self::KeyValue(entries) => entries.is_empty(),
            Self::Rows(rows) => rows.is_empty(),
            Self::Inscriptions(rows) => rows.is_empty(),
            // always carries at least the link list key
            Self::Conservation(_) => false,
            Self::Missing => true,
        }
    }
}

/// Everything scraped from one detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub unique_id: String,
    pub url: String,
    pub title: String,
    pub sections: Vec<(SectionKind, MetadataSection)>,
}

impl ArtifactMetadata {
    pub const UNIQUE_ID_COLUMN: &'static str = "UniqueID";
    pub const URL_COLUMN: &'static str = "URL";
    pub const TITLE_COLUMN: &'static str = "文物名称";
    pub const MISSING_TITLE: &'static str = "N/A";

    /// CSV header, fixed regardless of which sections a page has
    pub fn csv_headers() -> Vec<&'static str> {
        let mut headers = vec![Self::UNIQUE_ID_COLUMN, Self::URL_COLUMN, Self::TITLE_COLUMN];
        headers.extend(SectionKind::ALL.iter().map(|kind| kind.label()));
        headers
    }

    pub fn section(&self, kind: SectionKind) -> Option<&MetadataSection> {
        self.sections
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, section)| section)
    }

    /// One CSV row aligned with [`Self::csv_headers`]; non-empty sections are
    /// JSON-encoded into their cell
    pub fn csv_record(&self) -> serde_json::Result<Vec<String>> {
        let mut record = vec![self.unique_id.clone(), self.url.clone(), self.title.clone()];
        for kind in SectionKind::ALL {
            let cell = match self.section(kind) {
                Some(section) if !section.is_empty() => serde_json::to_string(section)?,
                _ => String::new(),
            };
            record.push(cell);
        }
        Ok(record)
    }
}

struct PairMap<'a>(&'a [(String, String)]);

impl Serialize for PairMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for TableRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PairMap(&self.cells).serialize(serializer)
    }
}

impl Serialize for InscriptionRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.seals.is_some());
        let mut map = serializer.serialize_map(Some(self.cells.len() + extra))?;
        for (key, value) in &self.cells {
            map.serialize_entry(key, value)?;
        }
        if let Some(seals) = &self.seals {
            map.serialize_entry(SectionKind::Seals.label(), seals)?;
        }
        map.end()
    }
}

impl Serialize for ConservationLink {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("文本", &self.text)?;
        map.serialize_entry("onclick", &self.onclick)?;
        map.end()
    }
}

impl Serialize for ConservationInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(description) = &self.description {
            map.serialize_entry("說明", description)?;
        }
        map.serialize_entry("相關連結", &self.links)?;
        map.end()
    }
}

impl Serialize for MetadataSection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::KeyValue(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for entry in entries {
                    match entry.values.as_slice() {
                        [single] => map.serialize_entry(&entry.key, single)?,
                        many => map.serialize_entry(&entry.key, many)?,
                    }
                }
                map.end()
            }
            Self::Rows(rows) => {
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(row)?;
                }
                seq.end()
            }
            Self::Inscriptions(rows) => rows.serialize(serializer),
            Self::Conservation(info) => info.serialize(serializer),
            Self::Missing => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

impl Serialize for ArtifactMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.sections.len()))?;
        map.serialize_entry(Self::UNIQUE_ID_COLUMN, &self.unique_id)?;
        map.serialize_entry(Self::URL_COLUMN, &self.url)?;
        map.serialize_entry(Self::TITLE_COLUMN, &self.title)?;
        for (kind, section) in &self.sections {
            map.serialize_entry(kind.label(), section)?;
        }
        map.end()
    }
}
