//! `[build]` section configuration.
//!
//! Directory layout for the build pipeline: where pages, templates and
//! data files live, and where the compiled site is written.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in stilo.toml - build pipeline settings.
///
/// # Example
/// ```toml
/// [build]
/// pages = "pages"
/// templates = "templates"
/// data = "data"
/// output = "build"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (set from CLI, not from the config file)
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Directory of page sources (`*.html` with a directive prologue)
    #[serde(default = "defaults::build::pages")]
    #[educe(Default = defaults::build::pages())]
    pub pages: PathBuf,

    /// Directory of HTML templates referenced by page directives
    #[serde(default = "defaults::build::templates")]
    #[educe(Default = defaults::build::templates())]
    pub templates: PathBuf,

    /// Directory of static data files copied verbatim into the output
    #[serde(default = "defaults::build::data")]
    #[educe(Default = defaults::build::data())]
    pub data: PathBuf,

    /// Build output directory. Sole write target of the pipeline.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,
}
