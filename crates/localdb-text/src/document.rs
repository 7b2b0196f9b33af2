//! Turns extracted [`Content`] into an indexable document.

use chrono::{DateTime, Datelike, FixedOffset};
use tantivy::schema::{Facet, Field};
use tantivy::TantivyDocument;
use tracing::{debug, info};

use localdb_core::types::{Content, MetadataValue};

use crate::analyzer::AnalyzerSelector;
use crate::facet_schema::FacetSchema;
use crate::tantivy_utils::IndexFields;

pub const LANGUAGE_DIMENSION: &str = "language";

/// MD5 of the empty blob. Never used as a dedup key.
pub const EMPTY_CONTENT_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// A metadata value after key-based classification.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Label(String),
    Number(i64),
    Timestamp(DateTime<FixedOffset>),
}

/// The document as it will be written, before conversion to tantivy.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub unique_id: String,
    pub path: String,
    pub content_md5: String,
    pub location_id: String,
    pub language: String,
    pub size: u64,
    pub last_modified: i64,
    pub content_field: Field,
    pub blob: String,
    pub facets: Vec<Facet>,
    pub numbers: Vec<(Field, i64)>,
}

impl IndexedDocument {
    pub fn into_tantivy(self, fields: &IndexFields) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_text(fields.unique_id, &self.unique_id);
        doc.add_text(fields.path, &self.path);
        doc.add_text(fields.content_md5, &self.content_md5);
        doc.add_text(fields.location_id, &self.location_id);
        doc.add_text(fields.language, &self.language);
        doc.add_u64(fields.size, self.size);
        doc.add_i64(fields.last_modified, self.last_modified);
        doc.add_text(self.content_field, &self.blob);
        doc.add_text(fields.content_not_stemmed, &self.blob);
        for facet in self.facets {
            doc.add_facet(fields.facets, facet);
        }
        for (field, value) in self.numbers {
            doc.add_i64(field, value);
        }
        doc
    }
}

pub struct DocumentBuilder<'a> {
    fields: &'a IndexFields,
    selector: &'a AnalyzerSelector,
    facet_schema: &'a FacetSchema,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(fields: &'a IndexFields, selector: &'a AnalyzerSelector, facet_schema: &'a FacetSchema) -> Self {
        Self { fields, selector, facet_schema }
    }

    /// Decide once how a metadata value is indexed. Numeric keys that do not
    /// start with an integer yield `None` and are left out.
    pub fn classify(&self, key: &str, value: &MetadataValue) -> Option<FieldValue> {
        match value {
            MetadataValue::Timestamp(ts) => Some(FieldValue::Timestamp(*ts)),
            MetadataValue::Text(text) if self.fields.numeric.contains_key(key) => {
                parse_leading_integer(text).map(FieldValue::Number)
            }
            MetadataValue::Text(text) if text.is_empty() => None,
            MetadataValue::Text(text) => Some(FieldValue::Label(text.clone())),
        }
    }

    pub fn build(&self, location_id: &str, content: &Content) -> IndexedDocument {
        let path = content.path.to_string_lossy().into_owned();
        let language = normalize_language(&content.language);

        let mut blob = content.text.clone();
        let mut facets = vec![Facet::from_path([LANGUAGE_DIMENSION, language.as_str()])];
        let mut numbers = Vec::new();
        self.facet_schema.set_multi_valued(LANGUAGE_DIMENSION);

        for (key, value) in &content.metadata {
            if key.is_empty() {
                continue;
            }
            match value {
                MetadataValue::Text(text) => {
                    self.facet_schema.set_multi_valued(key);
                    blob.push(' ');
                    blob.push_str(text);
                }
                MetadataValue::Timestamp(_) => self.facet_schema.set_hierarchical(key),
            }
            match self.classify(key, value) {
                Some(FieldValue::Label(label)) => facets.push(Facet::from_path([key.as_str(), label.as_str()])),
                Some(FieldValue::Number(n)) => {
                    if let Some(field) = self.fields.numeric.get(key) {
                        numbers.push((*field, n));
                    }
                }
                Some(FieldValue::Timestamp(ts)) => self.add_date_facets(key, &ts, &mut blob, &mut facets),
                None => debug!(path = %path, key = %key, "metadata value skipped"),
            }
        }

        let content_field = self.selector.field_for(&language);
        if self.selector.supports(&language) {
            info!(path = %path, language = %language, "using language specific content field");
        } else {
            info!(path = %path, language = %language, "no analyzer for language, using default content field");
        }

        let content_md5 = format!("{:x}", md5::compute(blob.as_bytes()));

        IndexedDocument {
            unique_id: uuid::Uuid::new_v4().to_string(),
            path,
            content_md5,
            location_id: location_id.to_string(),
            language,
            size: content.size_bytes,
            last_modified: content.last_modified_millis,
            content_field,
            blob,
            facets,
            numbers,
        }
    }

    fn add_date_facets(&self, key: &str, ts: &DateTime<FixedOffset>, blob: &mut String, facets: &mut Vec<Facet>) {
        let day = format!("{:04}/{:02}/{:02}", ts.year(), ts.month(), ts.day());
        let year = format!("{:04}", ts.year());
        let month = format!("{:04}/{:02}", ts.year(), ts.month());

        for (suffix, value) in [("-year-month-day", &day), ("-year", &year), ("-year-month", &month)] {
            blob.push(' ');
            blob.push_str(value);
            let dimension = format!("{key}{suffix}");
            self.facet_schema.set_multi_valued(&dimension);
            facets.push(Facet::from_path([dimension.as_str(), value.as_str()]));
        }
        facets.push(self.facet_schema.facet_for(key, &day));
    }
}

fn normalize_language(code: &str) -> String {
    let code = code.trim().to_ascii_lowercase();
    if code.is_empty() { "unknown".to_string() } else { code }
}

/// Parse the integer a string starts with, e.g. `"1,024 px"` -> 1024.
/// `,` is accepted as a grouping separator between digits.
pub fn parse_leading_integer(text: &str) -> Option<i64> {
    let mut chars = text.trim_start().chars().peekable();
    let negative = match chars.peek() {
        Some('-') => {
            chars.next();
            true
        }
        Some('+') => {
            chars.next();
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    let mut digits = 0usize;
    while let Some(&c) = chars.peek() {
        if let Some(d) = c.to_digit(10) {
            value = value.checked_mul(10)?.checked_add(i64::from(d))?;
            digits += 1;
            chars.next();
        } else if c == ',' && digits > 0 {
            let mut lookahead = chars.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(char::is_ascii_digit) {
                chars.next();
            } else {
                break;
            }
        } else {
            break;
        }
    }

    if digits == 0 {
        return None;
    }
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tantivy_utils::build_schema;
    use chrono::TimeZone;

    fn fixture() -> (IndexFields, AnalyzerSelector, FacetSchema) {
        let numeric = vec!["focal-length-35".to_string()];
        let schema = build_schema(&numeric);
        let fields = IndexFields::from_schema(&schema, &numeric).expect("fields");
        let selector = AnalyzerSelector::new(&fields, &["en".to_string()]);
        (fields, selector, FacetSchema::new())
    }

    fn facet_strings(doc: &IndexedDocument) -> Vec<Vec<String>> {
        doc.facets.iter().map(|f| f.to_path().into_iter().map(String::from).collect()).collect()
    }

    #[test]
    fn leading_integer_parsing() {
        assert_eq!(parse_leading_integer("50 mm"), Some(50));
        assert_eq!(parse_leading_integer("1,024 px"), Some(1024));
        assert_eq!(parse_leading_integer("-3"), Some(-3));
        assert_eq!(parse_leading_integer("24.5mm"), Some(24));
        assert_eq!(parse_leading_integer("12, 3"), Some(12));
        assert_eq!(parse_leading_integer("mm 50"), None);
        assert_eq!(parse_leading_integer(""), None);
        assert_eq!(parse_leading_integer("99999999999999999999"), None);
    }

    #[test]
    fn string_metadata_becomes_labels_and_blob() {
        let (fields, selector, facet_schema) = fixture();
        let builder = DocumentBuilder::new(&fields, &selector, &facet_schema);
        let content = Content::new("/docs/a.txt", "hello world")
            .with_language("en")
            .with_metadata("author", "Jane")
            .with_metadata("author", "")
            .with_metadata("", "ignored");
        let doc = builder.build("loc-1", &content);

        assert_eq!(doc.blob, "hello world Jane ");
        assert_eq!(doc.content_field, fields.language_content[&crate::tantivy_utils::SupportedLanguage::English]);
        assert!(facet_strings(&doc).contains(&vec!["author".to_string(), "Jane".to_string()]));
        assert!(facet_strings(&doc).contains(&vec!["language".to_string(), "en".to_string()]));
        assert_eq!(doc.facets.len(), 2);
        assert!(facet_schema.get("author").is_some_and(|c| c.multi_valued));
        assert_eq!(doc.content_md5, format!("{:x}", md5::compute("hello world Jane ")));
    }

    #[test]
    fn numeric_keys_become_numbers_not_labels() {
        let (fields, selector, facet_schema) = fixture();
        let builder = DocumentBuilder::new(&fields, &selector, &facet_schema);
        let content = Content::new("/img/a.jpg", "")
            .with_metadata("focal-length-35", "50 mm")
            .with_metadata("focal-length-35", "unknown");
        let doc = builder.build("loc", &content);

        assert_eq!(doc.numbers, vec![(fields.numeric["focal-length-35"], 50)]);
        assert!(doc.facets.iter().all(|f| f.to_path()[0] == "language"));
        assert_eq!(doc.blob, " 50 mm unknown");
        assert_eq!(doc.content_field, fields.content);
    }

    #[test]
    fn timestamps_expand_to_date_facets() {
        let (fields, selector, facet_schema) = fixture();
        let builder = DocumentBuilder::new(&fields, &selector, &facet_schema);
        let ts = FixedOffset::east_opt(0).expect("offset").with_ymd_and_hms(2014, 2, 20, 10, 0, 0).single().expect("ts");
        let content = Content::new("/docs/b.txt", "text").with_metadata("created", ts);
        let doc = builder.build("loc", &content);

        assert_eq!(doc.blob, "text 2014/02/20 2014 2014/02");
        let facets = facet_strings(&doc);
        assert!(facets.contains(&vec!["created-year".to_string(), "2014".to_string()]));
        assert!(facets.contains(&vec!["created-year-month".to_string(), "2014/02".to_string()]));
        assert!(facets.contains(&vec!["created-year-month-day".to_string(), "2014/02/20".to_string()]));
        assert!(facets.contains(&vec!["created".to_string(), "2014".to_string(), "02".to_string(), "20".to_string()]));
        assert!(facet_schema.is_hierarchical("created"));
        assert!(facet_schema.get("created-year").is_some_and(|c| c.multi_valued));
    }

    #[test]
    fn each_build_gets_a_fresh_unique_id() {
        let (fields, selector, facet_schema) = fixture();
        let builder = DocumentBuilder::new(&fields, &selector, &facet_schema);
        let content = Content::new("/docs/c.txt", "");
        let a = builder.build("loc", &content);
        let b = builder.build("loc", &content);
        assert_ne!(a.unique_id, b.unique_id);
        assert_eq!(a.content_md5, EMPTY_CONTENT_MD5);
    }
}
