//! File system watcher for rebuild-on-change.
//!
//! Monitors the pages, templates and data directories and reports
//! qualifying changes to the dev server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌─────────────────────────────┐    ┌─────────────┐
//! │ notify   │───▶│ filter + debounce (1s drop) │───▶│ on_change() │
//! │ events   │    │ (watcher thread)            │    │ (try_send)  │
//! └──────────┘    └─────────────────────────────┘    └─────────────┘
//! ```
//!
//! The watcher thread never blocks on a rebuild: `on_change` is a
//! non-blocking trigger push and the build itself runs on the server's
//! rebuild worker (see `serve`).

use crate::{config::SiteConfig, log};
use anyhow::{Context, Result, bail};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Minimum spacing between accepted change events. Events landing inside
/// the window are dropped, not queued.
pub const DEBOUNCE: Duration = Duration::from_secs(1);

/// How often the event loop wakes to check the stop flag.
const STOP_POLL: Duration = Duration::from_millis(200);

/// Extensions that affect build output: markup, stylesheets, scripts and
/// the site config.
const ACCEPTED_EXTENSIONS: &[&str] = &["html", "htm", "css", "js", "toml"];

// =============================================================================
// Event Filter
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Create/modify/remove are the kinds that can change build input.
const fn is_relevant_kind(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Should a change at this path cause a rebuild?
///
/// Paths inside the build output are the pipeline's own writes; accepting
/// them would loop rebuilds forever.
fn should_rebuild(path: &Path, output: &Path) -> bool {
    if path.starts_with(output) || is_temp_file(path) {
        return false;
    }

    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

// =============================================================================
// Debounce State
// =============================================================================

/// Drop-in-window debounce: an event inside [`DEBOUNCE`] of the last
/// accepted event is discarded. Rejected events do not extend the window.
struct Debounce {
    last_accepted: Option<Instant>,
}

impl Debounce {
    const fn new() -> Self {
        Self {
            last_accepted: None,
        }
    }

    fn accept(&mut self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.duration_since(last) < DEBOUNCE => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }
}

// =============================================================================
// ChangeWatcher
// =============================================================================

/// Owns the watcher thread and its stop flag.
///
/// Construction starts watching immediately; [`ChangeWatcher::stop`]
/// blocks until the thread has fully quiesced.
pub struct ChangeWatcher {
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl ChangeWatcher {
    /// Watch the source roots that exist (pages, templates, data) and
    /// invoke `on_change` once per accepted event.
    ///
    /// `on_change` must not block; the production callback is a
    /// single-slot `try_send`.
    pub fn spawn(
        config: &'static SiteConfig,
        on_change: impl Fn() + Send + 'static,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher =
            notify::recommended_watcher(tx).context("failed to create file watcher")?;

        let roots = [
            &config.build.pages,
            &config.build.templates,
            &config.build.data,
        ];
        let mut watched = Vec::new();
        for root in roots {
            if root.exists() {
                watcher
                    .watch(root, RecursiveMode::Recursive)
                    .with_context(|| format!("failed to watch {}", root.display()))?;
                watched.push(root.display().to_string());
            }
        }
        if watched.is_empty() {
            bail!("no source directories to watch");
        }
        log!("watch"; "watching {}", watched.join(", "));

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let output = config.build.output.clone();

        let worker = thread::spawn(move || {
            // Keep the notify handle alive for the thread's lifetime
            let _watcher = watcher;
            let mut debounce = Debounce::new();

            while !stop_flag.load(Ordering::Relaxed) {
                match rx.recv_timeout(STOP_POLL) {
                    Ok(Ok(event)) if is_relevant_kind(&event) => {
                        let Some(path) =
                            event.paths.iter().find(|p| should_rebuild(p, &output))
                        else {
                            continue;
                        };
                        if debounce.accept(Instant::now()) {
                            log!("watch"; "{} changed, scheduling rebuild", path.display());
                            on_change();
                        }
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => log!("watch"; "error: {err}"),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(Self {
            worker: Some(worker),
            stop,
        })
    }

    /// Stop watching. Blocks until the watcher thread has exited, so no
    /// trigger can be emitted after this returns.
    pub fn stop(mut self) {
        self.shutdown();
        log!("watch"; "stopped");
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
