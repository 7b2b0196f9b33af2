//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_SEARCH__MAX_HITS`).
//! The index directory is expanded with `shellexpand` when resolved.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::types::QueryOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub analysis: AnalysisSettings,
    pub facets: FacetSettings,
    pub search: SearchSettings,
    pub suggest: SuggestSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Directory holding the index; `~` and `$VAR` are expanded.
    pub dir: String,
    pub commit_interval_ms: u64,
    pub writer_heap_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Languages that get their own stemmed content field.
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSettings {
    pub dimension: String,
    pub display_name: String,
}

impl DimensionSettings {
    pub fn new(dimension: &str, display_name: &str) -> Self {
        Self { dimension: dimension.to_string(), display_name: display_name.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetSettings {
    /// Flat dimensions reported with every query, in display order.
    pub dimensions: Vec<DimensionSettings>,
    /// Numeric dimension bucketed into the fixed ranges.
    pub range_dimension: DimensionSettings,
    /// Metadata keys whose values are parsed as numbers instead of labels.
    pub numeric_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_hits: usize,
    pub snippet_fragments: usize,
    pub snippet_max_chars: usize,
    pub highlight_workers: usize,
    pub max_facet_labels: usize,
    pub show_similar_documents: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestSettings {
    pub max_suggestions: usize,
    pub max_edit_distance: u8,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            dir: "~/.localdb/index".to_string(),
            commit_interval_ms: 2000,
            writer_heap_bytes: 50_000_000,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self { languages: vec!["en".to_string(), "de".to_string()] }
    }
}

impl Default for FacetSettings {
    fn default() -> Self {
        Self {
            dimensions: vec![
                DimensionSettings::new("author", "Author"),
                DimensionSettings::new("keywords", "Keywords"),
                DimensionSettings::new("last-modified-year", "Last modified"),
                DimensionSettings::new("extension", "File types"),
            ],
            range_dimension: DimensionSettings::new("focal-length-35", "Focal length"),
            numeric_fields: vec!["focal-length-35".to_string(), "image-height".to_string()],
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_hits: 50,
            snippet_fragments: 5,
            snippet_max_chars: 150,
            highlight_workers: 4,
            max_facet_labels: 20_000,
            show_similar_documents: false,
        }
    }
}

impl Default for SuggestSettings {
    fn default() -> Self {
        Self { max_suggestions: 10, max_edit_distance: 1 }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index: IndexSettings::default(),
            analysis: AnalysisSettings::default(),
            facets: FacetSettings::default(),
            search: SearchSettings::default(),
            suggest: SuggestSettings::default(),
        }
    }
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let settings: Settings = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load settings for '{}': {}", env_name, e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults pointing at `dir`, convenient for tests and embedding.
    pub fn for_dir(dir: &Path) -> Self {
        let mut settings = Self::default();
        settings.index.dir = dir.to_string_lossy().into_owned();
        settings
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.index.dir.trim().is_empty() {
            anyhow::bail!("index.dir must not be empty");
        }
        if self.index.commit_interval_ms == 0 {
            anyhow::bail!("index.commit_interval_ms must be > 0");
        }
        if self.search.max_hits == 0 {
            anyhow::bail!("search.max_hits must be > 0");
        }
        if self.search.highlight_workers == 0 {
            anyhow::bail!("search.highlight_workers must be > 0");
        }
        if self.search.snippet_max_chars == 0 {
            anyhow::bail!("search.snippet_max_chars must be > 0");
        }
        if self.suggest.max_suggestions == 0 {
            anyhow::bail!("suggest.max_suggestions must be > 0");
        }
        Ok(())
    }

    pub fn index_dir(&self) -> PathBuf {
        expand_path(&self.index.dir)
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            max_hits: self.search.max_hits,
            show_similar_documents: self.search.show_similar_documents,
        }
    }
}

/// Expand `~` and `$VAR`/`${VAR}` in a configured path. Not canonicalized,
/// the index directory may not exist yet.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.index.commit_interval_ms, 2000);
        assert_eq!(settings.facets.range_dimension.dimension, "focal-length-35");
    }

    #[test]
    fn toml_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [search]
                max_hits = 7

                [analysis]
                languages = ["fr"]
                "#,
            )?;
            jail.create_file("config.test.toml", "[suggest]\nmax_suggestions = 3\n")?;
            jail.set_env("APP_SEARCH__SHOW_SIMILAR_DOCUMENTS", "true");

            let settings = Settings::load_for_env("test").expect("load");
            assert_eq!(settings.search.max_hits, 7);
            assert!(settings.search.show_similar_documents);
            assert_eq!(settings.suggest.max_suggestions, 3);
            assert_eq!(settings.analysis.languages, vec!["fr".to_string()]);
            // untouched sections keep their defaults
            assert_eq!(settings.search.snippet_fragments, 5);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[search]\nhighlight_workers = 0\n")?;
            assert!(Settings::load_for_env("prod").is_err());
            Ok(())
        });
    }

    #[test]
    fn index_dir_expands_env_vars() {
        Jail::expect_with(|jail| {
            jail.set_env("LOCALDB_ROOT", "/data");
            let settings = Settings::for_dir(Path::new("$LOCALDB_ROOT/idx"));
            assert_eq!(settings.index_dir(), PathBuf::from("/data/idx"));
            Ok(())
        });
    }
}
