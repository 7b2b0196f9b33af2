use std::collections::BTreeMap;

use tantivy::schema::{
    FacetOptions, Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions, STORED, STRING,
};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer, TokenStream,
};
use tantivy::Index;

pub const FIELD_UNIQUE_ID: &str = "unique_id";
pub const FIELD_PATH: &str = "path";
pub const FIELD_CONTENT_MD5: &str = "content_md5";
pub const FIELD_LOCATION_ID: &str = "location_id";
pub const FIELD_LANGUAGE: &str = "language";
pub const FIELD_SIZE: &str = "size";
pub const FIELD_LAST_MODIFIED: &str = "last_modified";
pub const FIELD_FACETS: &str = "facets";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_CONTENT_NOT_STEMMED: &str = "content_not_stemmed";

pub const TOKENIZER_DEFAULT: &str = "text_with_stopwords";
pub const TOKENIZER_NOT_STEMMED: &str = "text_not_stemmed";

const MAX_TOKEN_LEN: usize = 255;

/// Languages with a dedicated stemmed content field. Every variant gets a
/// field in the schema so the on-disk layout does not depend on which
/// languages are switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SupportedLanguage {
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Greek,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
    Tamil,
    Turkish,
}

impl SupportedLanguage {
    pub const ALL: [SupportedLanguage; 17] = [
        Self::Danish,
        Self::Dutch,
        Self::English,
        Self::Finnish,
        Self::French,
        Self::German,
        Self::Greek,
        Self::Hungarian,
        Self::Italian,
        Self::Norwegian,
        Self::Portuguese,
        Self::Romanian,
        Self::Russian,
        Self::Spanish,
        Self::Swedish,
        Self::Tamil,
        Self::Turkish,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::Danish => "da",
            Self::Dutch => "nl",
            Self::English => "en",
            Self::Finnish => "fi",
            Self::French => "fr",
            Self::German => "de",
            Self::Greek => "el",
            Self::Hungarian => "hu",
            Self::Italian => "it",
            Self::Norwegian => "no",
            Self::Portuguese => "pt",
            Self::Romanian => "ro",
            Self::Russian => "ru",
            Self::Spanish => "es",
            Self::Swedish => "sv",
            Self::Tamil => "ta",
            Self::Turkish => "tr",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    pub fn field_name(self) -> String {
        format!("{}_{}", FIELD_CONTENT, self.code())
    }

    pub fn tokenizer_name(self) -> String {
        format!("lang_{}", self.code())
    }

    fn stemmer_language(self) -> Language {
        match self {
            Self::Danish => Language::Danish,
            Self::Dutch => Language::Dutch,
            Self::English => Language::English,
            Self::Finnish => Language::Finnish,
            Self::French => Language::French,
            Self::German => Language::German,
            Self::Greek => Language::Greek,
            Self::Hungarian => Language::Hungarian,
            Self::Italian => Language::Italian,
            Self::Norwegian => Language::Norwegian,
            Self::Portuguese => Language::Portuguese,
            Self::Romanian => Language::Romanian,
            Self::Russian => Language::Russian,
            Self::Spanish => Language::Spanish,
            Self::Swedish => Language::Swedish,
            Self::Tamil => Language::Tamil,
            Self::Turkish => Language::Turkish,
        }
    }
}

/// Resolved schema fields for type-safe access.
#[derive(Debug, Clone)]
pub struct IndexFields {
    pub unique_id: Field,
    pub path: Field,
    pub content_md5: Field,
    pub location_id: Field,
    pub language: Field,
    pub size: Field,
    pub last_modified: Field,
    pub facets: Field,
    pub content: Field,
    pub content_not_stemmed: Field,
    pub language_content: BTreeMap<SupportedLanguage, Field>,
    pub numeric: BTreeMap<String, Field>,
}

impl IndexFields {
    pub fn from_schema(schema: &Schema, numeric_fields: &[String]) -> tantivy::Result<Self> {
        let mut language_content = BTreeMap::new();
        for lang in SupportedLanguage::ALL {
            language_content.insert(lang, schema.get_field(&lang.field_name())?);
        }
        let mut numeric = BTreeMap::new();
        for name in numeric_fields {
            numeric.insert(name.clone(), schema.get_field(name)?);
        }
        Ok(Self {
            unique_id: schema.get_field(FIELD_UNIQUE_ID)?,
            path: schema.get_field(FIELD_PATH)?,
            content_md5: schema.get_field(FIELD_CONTENT_MD5)?,
            location_id: schema.get_field(FIELD_LOCATION_ID)?,
            language: schema.get_field(FIELD_LANGUAGE)?,
            size: schema.get_field(FIELD_SIZE)?,
            last_modified: schema.get_field(FIELD_LAST_MODIFIED)?,
            facets: schema.get_field(FIELD_FACETS)?,
            content: schema.get_field(FIELD_CONTENT)?,
            content_not_stemmed: schema.get_field(FIELD_CONTENT_NOT_STEMMED)?,
            language_content,
            numeric,
        })
    }

    /// Every field that stores the analyzed blob for highlighting.
    pub fn content_fields(&self) -> impl Iterator<Item = Field> + '_ {
        std::iter::once(self.content).chain(self.language_content.values().copied())
    }
}

/// Names taken by built-in fields. Configured numeric fields may not reuse them.
pub fn reserved_field_names() -> Vec<String> {
    let builtin = [
        FIELD_UNIQUE_ID,
        FIELD_PATH,
        FIELD_CONTENT_MD5,
        FIELD_LOCATION_ID,
        FIELD_LANGUAGE,
        FIELD_SIZE,
        FIELD_LAST_MODIFIED,
        FIELD_FACETS,
        FIELD_CONTENT,
        FIELD_CONTENT_NOT_STEMMED,
    ];
    builtin
        .iter()
        .map(|s| s.to_string())
        .chain(SupportedLanguage::ALL.iter().map(|l| l.field_name()))
        .collect()
}

fn content_options(tokenizer: &str, stored: bool) -> TextOptions {
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(tokenizer)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let options = TextOptions::default().set_indexing_options(indexing);
    if stored { options.set_stored() } else { options }
}

fn numeric_options() -> NumericOptions {
    NumericOptions::default().set_indexed().set_stored().set_fast()
}

/// Build the schema. Numeric range fields come from configuration and are
/// part of the on-disk layout, so changing them requires a fresh index.
pub fn build_schema(numeric_fields: &[String]) -> Schema {
    let mut schema_builder = Schema::builder();

    schema_builder.add_text_field(FIELD_UNIQUE_ID, STRING | STORED);
    schema_builder.add_text_field(FIELD_PATH, STRING | STORED);
    schema_builder.add_text_field(FIELD_CONTENT_MD5, STRING | STORED);
    schema_builder.add_text_field(FIELD_LOCATION_ID, STRING | STORED);
    schema_builder.add_text_field(FIELD_LANGUAGE, STRING | STORED);
    schema_builder.add_u64_field(FIELD_SIZE, numeric_options());
    schema_builder.add_i64_field(FIELD_LAST_MODIFIED, numeric_options());
    schema_builder.add_facet_field(FIELD_FACETS, FacetOptions::default());

    schema_builder.add_text_field(FIELD_CONTENT, content_options(TOKENIZER_DEFAULT, true));
    for lang in SupportedLanguage::ALL {
        schema_builder.add_text_field(&lang.field_name(), content_options(&lang.tokenizer_name(), true));
    }
    schema_builder.add_text_field(FIELD_CONTENT_NOT_STEMMED, content_options(TOKENIZER_NOT_STEMMED, false));

    for name in numeric_fields {
        schema_builder.add_i64_field(name, numeric_options());
    }

    schema_builder.build()
}

const DEFAULT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not",
    "this", "these", "they", "them", "their", "there", "then", "than", "so", "if", "when",
    "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could", "should",
    "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having",
    "been", "were",
];

fn language_analyzer(lang: SupportedLanguage) -> TextAnalyzer {
    let language = lang.stemmer_language();
    match StopWordFilter::new(language) {
        Some(stop_words) => TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(stop_words)
            .filter(Stemmer::new(language))
            .build(),
        None => TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(Stemmer::new(language))
            .build(),
    }
}

pub fn default_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(DEFAULT_STOP_WORDS.iter().map(|s| s.to_string())))
        .build()
}

pub fn not_stemmed_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .build()
}

pub fn register_tokenizers(index: &Index) {
    let manager = index.tokenizers();
    manager.register(TOKENIZER_DEFAULT, default_analyzer());
    manager.register(TOKENIZER_NOT_STEMMED, not_stemmed_analyzer());
    for lang in SupportedLanguage::ALL {
        manager.register(&lang.tokenizer_name(), language_analyzer(lang));
    }
}

/// Tokenize `text` the way the non-stemmed field does.
pub fn not_stemmed_tokens(text: &str) -> Vec<String> {
    let mut analyzer = not_stemmed_analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}
