//! Page compilation.
//!
//! Turns one page source into one HTML document:
//!
//! ```text
//! pages/<stem>.html ──┐
//!                     ├── page::compile() ──► CompiledPage { html, output }
//! templates/<name>.html ─┘
//! ```
//!
//! - [`template`]: loads named templates from the templates root
//! - [`page`]: directive extraction, title derivation, marker substitution

pub mod page;
pub mod template;

pub use page::{CompileOutcome, CompiledPage, compile};
pub use template::{PAGE_EXT, TemplateResolver};

use std::fs;
use std::path::{Path, PathBuf};

/// Collect page source files (`*.html`) directly under the pages root.
///
/// Non-recursive: the pages directory is a flat namespace of stems.
/// Returns an empty list when the directory is missing or unreadable.
/// Sorted for deterministic build logs.
pub fn collect_page_files(pages_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(pages_dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == PAGE_EXT)
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_page_files_filters_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "").unwrap();
        fs::write(dir.path().join("about.html"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/deep.html"), "").unwrap();

        let files = collect_page_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        // Flat, sorted, html-only; the nested file is not a page
        assert_eq!(names, vec!["about.html", "index.html"]);
    }

    #[test]
    fn test_collect_page_files_missing_dir() {
        let dir = TempDir::new().unwrap();
        let files = collect_page_files(&dir.path().join("nope"));
        assert!(files.is_empty());
    }
}
