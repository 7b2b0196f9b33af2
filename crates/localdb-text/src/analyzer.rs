use tantivy::schema::Field;
use tracing::warn;

use crate::tantivy_utils::{IndexFields, SupportedLanguage};

/// Maps a detected language onto the content field whose analyzer handles
/// it. Languages that are not switched on fall back to the default field.
#[derive(Debug, Clone)]
pub struct AnalyzerSelector {
    default_field: Field,
    active: Vec<(SupportedLanguage, Field)>,
}

impl AnalyzerSelector {
    pub fn new(fields: &IndexFields, languages: &[String]) -> Self {
        let mut active = Vec::new();
        for code in languages {
            match SupportedLanguage::from_code(code) {
                Some(lang) => {
                    if active.iter().any(|(l, _)| *l == lang) {
                        continue;
                    }
                    if let Some(field) = fields.language_content.get(&lang) {
                        active.push((lang, *field));
                    }
                }
                None => warn!(language = %code, "no analyzer for configured language, ignoring"),
            }
        }
        Self { default_field: fields.content, active }
    }

    pub fn language_for(&self, code: &str) -> Option<SupportedLanguage> {
        let lang = SupportedLanguage::from_code(code)?;
        self.active.iter().any(|(l, _)| *l == lang).then_some(lang)
    }

    pub fn supports(&self, code: &str) -> bool {
        self.language_for(code).is_some()
    }

    /// Content field for a document in `code`.
    pub fn field_for(&self, code: &str) -> Field {
        self.language_for(code)
            .and_then(|lang| self.active.iter().find(|(l, _)| *l == lang).map(|(_, f)| *f))
            .unwrap_or(self.default_field)
    }

    /// Fields a free-text query is replicated over: default first, then
    /// every active language.
    pub fn query_fields(&self) -> Vec<Field> {
        std::iter::once(self.default_field).chain(self.active.iter().map(|(_, f)| *f)).collect()
    }
}
