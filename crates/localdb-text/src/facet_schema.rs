//! Incrementally built facet dimension configuration.
//!
//! The document builder registers every dimension it emits; the planner
//! consults it to turn drill-down labels into facet paths. The schema is
//! persisted next to the index so hierarchical dimensions survive a reopen.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tantivy::schema::Facet;

use localdb_core::error::Result;

pub const SIDECAR_FILE: &str = "facet_schema.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionConfig {
    pub multi_valued: bool,
    pub hierarchical: bool,
}

#[derive(Debug, Default)]
pub struct FacetSchema {
    dimensions: RwLock<BTreeMap<String, DimensionConfig>>,
    dirty: RwLock<bool>,
}

impl FacetSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_multi_valued(&self, dimension: &str) {
        self.update(dimension, |c| c.multi_valued = true);
    }

    pub fn set_hierarchical(&self, dimension: &str) {
        self.update(dimension, |c| c.hierarchical = true);
    }

    fn update(&self, dimension: &str, apply: impl FnOnce(&mut DimensionConfig)) {
        let mut dims = self.dimensions.write().unwrap_or_else(|e| e.into_inner());
        let entry = dims.entry(dimension.to_string()).or_default();
        let before = *entry;
        apply(entry);
        if *entry != before {
            *self.dirty.write().unwrap_or_else(|e| e.into_inner()) = true;
        }
    }

    pub fn get(&self, dimension: &str) -> Option<DimensionConfig> {
        self.dimensions.read().unwrap_or_else(|e| e.into_inner()).get(dimension).copied()
    }

    pub fn is_hierarchical(&self, dimension: &str) -> bool {
        self.get(dimension).is_some_and(|c| c.hierarchical)
    }

    pub fn dimensions(&self) -> Vec<String> {
        self.dimensions.read().unwrap_or_else(|e| e.into_inner()).keys().cloned().collect()
    }

    /// Facet path for `label` under `dimension`. Labels of hierarchical
    /// dimensions are split on `/`, so `2014/02` addresses a subtree.
    pub fn facet_for(&self, dimension: &str, label: &str) -> Facet {
        if self.is_hierarchical(dimension) {
            let segments = label.split('/').filter(|s| !s.is_empty());
            Facet::from_path(std::iter::once(dimension).chain(segments))
        } else {
            Facet::from_path([dimension, label])
        }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = sidecar_path(dir);
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let dimensions: BTreeMap<String, DimensionConfig> = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self { dimensions: RwLock::new(dimensions), dirty: RwLock::new(false) })
    }

    /// Write the sidecar if anything changed since the last save.
    pub fn save_if_dirty(&self, dir: &Path) -> Result<()> {
        let mut dirty = self.dirty.write().unwrap_or_else(|e| e.into_inner());
        if !*dirty {
            return Ok(());
        }
        let json = {
            let dims = self.dimensions.read().unwrap_or_else(|e| e.into_inner());
            serde_json::to_string_pretty(&*dims)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        };
        let target = sidecar_path(dir);
        let tmp = target.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &target)?;
        *dirty = false;
        Ok(())
    }
}

fn sidecar_path(dir: &Path) -> PathBuf {
    dir.join(SIDECAR_FILE)
}
