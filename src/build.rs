//! Site building orchestration.
//!
//! One build run is three independent, individually-logged steps:
//!
//! ```text
//! build_site()
//!     │
//!     ├── clean_output()      ──► empty the output dir, keep the dir itself
//!     ├── copy_data_files()   ──► data/** copied verbatim into the output
//!     └── compile_pages()     ──► pages/*.html compiled via compiler::compile
//! ```
//!
//! A missing templates root fails the run before anything is touched.
//! Per-page problems (broken prologue, unknown template) are logged and
//! skipped; only clean/copy I/O failures flip the run to failure.

use crate::{
    compiler::{self, CompileOutcome, TemplateResolver, collect_page_files},
    config::SiteConfig,
    log,
};
use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use std::{
    ffi::OsStr,
    fmt, fs,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Counters from one successful build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub pages_built: usize,
    pub pages_skipped: usize,
    pub data_files: usize,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "built {} pages ({} skipped), copied {} data files",
            self.pages_built, self.pages_skipped, self.data_files
        )
    }
}

/// Build the entire site.
///
/// Success means clean, copy and compile all completed; skipped pages do
/// not count against it. The output directory itself survives every run
/// so a dev server bound inside it keeps working.
pub fn build_site(config: &SiteConfig) -> Result<BuildSummary> {
    let templates = &config.build.templates;

    // Nothing can compile without templates; bail before the clean step
    // touches the output tree.
    if !templates.is_dir() {
        bail!("templates directory not found: {}", templates.display());
    }

    clean_output(&config.build.output)?;
    let data_files = copy_data_files(&config.build.data, &config.build.output)?;
    let (pages_built, pages_skipped) = compile_pages(config)?;

    Ok(BuildSummary {
        pages_built,
        pages_skipped,
        data_files,
    })
}

/// Empty the output directory without deleting the directory itself.
///
/// A dev server may be serving from inside this path; removing and
/// recreating the root would strand it on a dead inode. Children are
/// removed instead: directories wholesale, files one by one.
fn clean_output(output: &Path) -> Result<()> {
    if !output.exists() {
        fs::create_dir_all(output)
            .with_context(|| format!("failed to create output directory {}", output.display()))?;
        log!("clean"; "created {}", output.display());
        return Ok(());
    }

    for entry in fs::read_dir(output)
        .with_context(|| format!("failed to read output directory {}", output.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        } else {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }

    log!("clean"; "cleaned {}", output.display());
    Ok(())
}

/// Copy every regular file under the data root into the output at the
/// same relative path. `fs::copy` carries permission bits along.
///
/// No data root is not an error - plenty of sites have no static files.
fn copy_data_files(data: &Path, output: &Path) -> Result<usize> {
    if !data.exists() {
        log!("data"; "no data directory, skipping");
        return Ok(0);
    }

    let files: Vec<_> = walkdir::WalkDir::new(data)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .collect();

    files.par_iter().try_for_each(|entry| {
        let rel = entry
            .path()
            .strip_prefix(data)
            .expect("walkdir yields children of its root");
        let dest = output.join(rel);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(entry.path(), &dest)
            .with_context(|| format!("failed to copy data file {}", rel.display()))?;
        Ok::<_, anyhow::Error>(())
    })?;

    log!("data"; "copied {} files", files.len());
    Ok(files.len())
}

/// Compile every page file independently; one page never blocks another.
///
/// Returns `(built, skipped)`. Pages that error (unreadable source,
/// template I/O) are logged and counted as skipped - a single bad page
/// must never abort the build.
fn compile_pages(config: &SiteConfig) -> Result<(usize, usize)> {
    let pages_dir = &config.build.pages;

    if !pages_dir.is_dir() {
        log!("pages"; "no pages directory, skipping");
        return Ok((0, 0));
    }

    let files = collect_page_files(pages_dir);
    if files.is_empty() {
        log!("pages"; "no page files in {}", pages_dir.display());
        return Ok((0, 0));
    }

    let resolver = TemplateResolver::new(&config.build.templates);
    let built = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);

    files.par_iter().for_each(|path| {
        match build_page(path, &resolver, &config.build.output) {
            Ok(true) => {
                built.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                log!("error"; "{}: {:#}", path.display(), err);
                skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    Ok((
        built.load(Ordering::Relaxed),
        skipped.load(Ordering::Relaxed),
    ))
}

/// Compile one page source and write it below the output root.
///
/// Returns `Ok(true)` when a page was written, `Ok(false)` on a skip.
/// The final HTML lands in a single `fs::write` so a concurrent reader
/// sees either the old file, no file, or the complete new file.
fn build_page(path: &Path, resolver: &TemplateResolver, output: &Path) -> Result<bool> {
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .with_context(|| format!("non-UTF-8 page filename: {}", path.display()))?;

    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read page {}", path.display()))?;

    match compiler::compile(stem, &source, resolver)? {
        CompileOutcome::Skipped { reason } => {
            log!("pages"; "skipped {stem}: {reason}");
            Ok(false)
        }
        CompileOutcome::Page(page) => {
            let dest = output.join(&page.output);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(&dest, &page.html)
                .with_context(|| format!("failed to write {}", dest.display()))?;
            log!("pages"; "{stem} -> {}", page.output.display());
            Ok(true)
        }
    }
}
