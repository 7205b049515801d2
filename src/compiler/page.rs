//! Page compilation: directive extraction and template substitution.
//!
//! A page source opens with a fixed two-line prologue of HTML comments:
//!
//! ```html
//! <!-- TEMPLATE: base -->
//! <!-- BACKGROUND: hero.png -->
//! <p>Page body...</p>
//! ```
//!
//! The prologue selects the template and a background token; the rest of
//! the file becomes the page body. The named template may carry three
//! markers - `<!-- TITLE -->`, `<!-- BACKGROUND -->`, `<!-- CONTENT -->` -
//! each substituted at most once. A page with a broken prologue or an
//! unknown template is skipped with a diagnostic; it never fails a build.

use super::template::{TemplateError, TemplateResolver};
use anyhow::Result;
use regex::{NoExpand, Regex};
use std::{path::PathBuf, sync::LazyLock};

/// `<!-- TEMPLATE: name -->` - required first non-blank line of a page.
static TEMPLATE_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<!--\s*TEMPLATE:\s*(\w+)\s*-->$").unwrap());

/// `<!-- BACKGROUND: token -->` - required second non-blank line.
static BACKGROUND_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<!--\s*BACKGROUND:\s*([\w.-]+)\s*-->$").unwrap());

/// Template markers. The colon-less comment form keeps them distinct
/// from the page-side directives.
static TITLE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*TITLE\s*-->").unwrap());
static BACKGROUND_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*BACKGROUND\s*-->").unwrap());
static CONTENT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*CONTENT\s*-->").unwrap());

/// Front-matter directives extracted from the top of a page source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDirectives {
    /// Template name (word characters only)
    pub template: String,
    /// Background filename token (word characters, `.`, `-`)
    pub background: String,
}

/// One compiled HTML document plus its output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPage {
    pub html: String,
    /// Output path relative to the build root:
    /// `index.html` for the `index` stem, `<stem>/index.html` otherwise.
    pub output: PathBuf,
}

/// Result of compiling one page source.
///
/// `Skipped` is the non-fatal path: the page produces no output and the
/// reason is logged, but the build as a whole stays successful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Page(CompiledPage),
    Skipped { reason: String },
}

/// Compile one page source against its template.
///
/// Pure transform: no filesystem writes happen here. Broken prologues
/// and unknown templates come back as [`CompileOutcome::Skipped`]; only
/// real I/O failures while reading an existing template are `Err`.
pub fn compile(
    stem: &str,
    source: &str,
    templates: &TemplateResolver,
) -> Result<CompileOutcome> {
    let (directives, body) = match extract_directives(source) {
        Ok(parsed) => parsed,
        Err(reason) => return Ok(CompileOutcome::Skipped { reason }),
    };

    let template = match templates.load(&directives.template) {
        Ok(template) => template,
        Err(err @ TemplateError::NotFound { .. }) => {
            return Ok(CompileOutcome::Skipped {
                reason: err.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let title = derive_title(stem);
    let html = substitute(&TITLE_MARKER, template, &title);
    let html = substitute(&BACKGROUND_MARKER, html, &directives.background);
    let html = substitute(&CONTENT_MARKER, html, &body);

    Ok(CompileOutcome::Page(CompiledPage {
        html,
        output: output_rel_path(stem),
    }))
}

/// Parse the two-line directive prologue, returning the directives and
/// the page body with both directive lines stripped.
///
/// The first non-blank line must be the TEMPLATE directive and the next
/// non-blank line the BACKGROUND directive. Anything else - swapped
/// order, a directive buried below other content, a malformed token -
/// reports the directive as missing rather than guessing.
pub fn extract_directives(source: &str) -> Result<(PageDirectives, String), String> {
    let mut lines = source.lines();

    let template = loop {
        match lines.next() {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => match TEMPLATE_DIRECTIVE.captures(line.trim()) {
                Some(captures) => break captures[1].to_string(),
                None => return Err("missing TEMPLATE directive".into()),
            },
            None => return Err("missing TEMPLATE directive".into()),
        }
    };

    let background = loop {
        match lines.next() {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => match BACKGROUND_DIRECTIVE.captures(line.trim()) {
                Some(captures) => break captures[1].to_string(),
                None => return Err("missing BACKGROUND directive".into()),
            },
            None => return Err("missing BACKGROUND directive".into()),
        }
    };

    let body = lines.collect::<Vec<_>>().join("\n");

    Ok((
        PageDirectives {
            template,
            background,
        },
        body,
    ))
}

/// Replace the first occurrence of `marker` with literal text.
///
/// Absent markers leave the document untouched; `NoExpand` keeps `$` in
/// page bodies from being misread as capture-group references.
fn substitute(marker: &Regex, text: String, replacement: &str) -> String {
    marker.replacen(&text, 1, NoExpand(replacement)).into_owned()
}

/// Derive a display title from a page stem.
///
/// `index` (any case) is the site root and always titles as `Home`.
/// Other stems swap hyphens for spaces and uppercase the first letter:
/// `my-page` → `My page`.
pub fn derive_title(stem: &str) -> String {
    if stem.eq_ignore_ascii_case("index") {
        return "Home".into();
    }

    let spaced = stem.replace('-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

/// Output path for a stem, relative to the build root.
pub fn output_rel_path(stem: &str) -> PathBuf {
    if stem.eq_ignore_ascii_case("index") {
        PathBuf::from("index.html")
    } else {
        PathBuf::from(stem).join("index.html")
    }
}
