use std::path::Path;

/// Preview/thumbnail collaborator. Failures are reported through the
/// result and degrade the preview flag, they never fail a query.
pub trait PreviewProcessor: Send + Sync {
    fn preview_available(&self, path: &Path) -> anyhow::Result<bool>;
}

/// Used when no preview renderer is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreview;

impl PreviewProcessor for NoPreview {
    fn preview_available(&self, _path: &Path) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Reports a preview for every file with one of the given extensions.
#[derive(Debug, Clone)]
pub struct ExtensionPreview {
    extensions: Vec<String>,
}

impl ExtensionPreview {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { extensions: extensions.into_iter().map(|e| e.into().to_lowercase()).collect() }
    }
}

impl PreviewProcessor for ExtensionPreview {
    fn preview_available(&self, path: &Path) -> anyhow::Result<bool> {
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
        Ok(ext.is_some_and(|e| self.extensions.iter().any(|x| *x == e)))
    }
}
