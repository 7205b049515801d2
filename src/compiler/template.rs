//! Template loading.
//!
//! Templates are plain HTML files in the templates root, addressed by
//! name: `<templatesRoot>/<name>.html`. A fresh read per compile - the
//! rebuild-per-change workload is small enough that caching would only
//! add staleness bugs.

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// File extension shared by templates and page sources.
pub const PAGE_EXT: &str = "html";

/// Template resolution errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template `{name}` not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("failed to read template `{0}`")]
    Io(String, #[source] io::Error),
}

/// Loads named template documents from a fixed templates root.
#[derive(Debug, Clone, Copy)]
pub struct TemplateResolver<'a> {
    templates_dir: &'a Path,
}

impl<'a> TemplateResolver<'a> {
    pub const fn new(templates_dir: &'a Path) -> Self {
        Self { templates_dir }
    }

    /// Load the template called `name`.
    ///
    /// Returns [`TemplateError::NotFound`] when no file exists for the
    /// name; other read failures surface as [`TemplateError::Io`].
    pub fn load(&self, name: &str) -> Result<String, TemplateError> {
        let path = self.templates_dir.join(format!("{name}.{PAGE_EXT}"));

        if !path.is_file() {
            return Err(TemplateError::NotFound {
                name: name.to_string(),
                path,
            });
        }

        fs::read_to_string(&path).map_err(|err| TemplateError::Io(name.to_string(), err))
    }
}
