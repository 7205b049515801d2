//! Development server with rebuild-on-change.
//!
//! A lightweight HTTP server over the build output, built on `tiny_http`:
//!
//! - Static file serving with content-type guessing
//! - Automatic `index.html` resolution for directories
//! - Directory listing with a clean HTML interface
//! - File watching and auto-rebuild (via `watch` module)
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │   Main Thread   │   │  Watcher Thread  │   │  Rebuild Worker  │
//! │  (HTTP Server)  │   │  (File Monitor)  │──▶│  (single slot)   │
//! └────────┬────────┘   └──────────────────┘   └────────┬─────────┘
//!          │                                            │
//!          ▼                                            ▼
//!    Serve files  ◀───────── build/ ◀──────────── build_site()
//! ```
//!
//! Requests are never handled on the rebuild worker, so a build in
//! flight never delays a response. A request that races a rebuild (file
//! deleted, not yet rewritten) gets the 503 rebuilding page with an
//! auto-refresh header instead of an error.

use crate::{
    build::build_site,
    config::SiteConfig,
    log,
    watch::ChangeWatcher,
};
use anyhow::{Context, Result, bail};
use std::{
    borrow::Cow,
    fs, io,
    net::SocketAddr,
    path::{Component, Path},
    sync::{
        Arc,
        mpsc::{self, SyncSender, TrySendError},
    },
    thread::{self, JoinHandle},
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

// ============================================================================
// Constants - HTML Templates
// ============================================================================

/// Rebuilding placeholder page (embedded at compile time)
const REBUILDING_TEMPLATE: &str = include_str!("embed/serve/rebuilding.html");

/// Directory listing HTML template (embedded at compile time)
const DIRECTORY_TEMPLATE: &str = include_str!("embed/serve/directory.html");

/// Auto-refresh interval (seconds) advertised on the 503 rebuilding page.
const REFRESH_SECS: u32 = 2;

// ============================================================================
// Rebuild Worker
// ============================================================================

/// Serialized rebuild execution behind a single-slot pending queue.
///
/// One worker thread drains a bounded(1) channel. While a build is in
/// flight a second trigger parks in the slot, and any further triggers
/// coalesce into it: builds never overlap and pending work never stacks
/// beyond one follow-up run.
pub struct RebuildWorker {
    worker: JoinHandle<()>,
}

/// Sending side of the rebuild slot. Clone freely; drop all clones to
/// let the worker drain and exit.
#[derive(Clone)]
pub struct RebuildHandle {
    slot: SyncSender<()>,
}

impl RebuildHandle {
    /// Request a rebuild. Never blocks: a full slot means a follow-up
    /// build is already scheduled, so this trigger coalesces into it.
    pub fn request(&self) {
        match self.slot.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => {}
        }
    }
}

impl RebuildWorker {
    /// Spawn the worker; `job` runs once per drained trigger.
    pub fn spawn(job: impl Fn() + Send + 'static) -> (Self, RebuildHandle) {
        let (slot, triggers) = mpsc::sync_channel(1);
        let worker = thread::spawn(move || {
            while triggers.recv().is_ok() {
                job();
            }
        });

        (Self { worker }, RebuildHandle { slot })
    }

    /// Wait for the worker to drain and exit. An in-flight build and one
    /// parked trigger are allowed to finish; all handles must already be
    /// dropped or this blocks indefinitely.
    pub fn join(self) {
        self.worker.join().ok();
    }
}

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the development server with optional file watching.
///
/// Lifecycle: optional initial build → serving, with the watcher and
/// rebuild worker flipping the output tree underneath → ordered stop on
/// Ctrl+C (watcher first, then the rebuild worker, then the listener).
pub fn serve_site(config: &'static SiteConfig) -> Result<()> {
    if config.serve.skip_build {
        log!("serve"; "skipping initial build");
    } else {
        // A failed initial build is not fatal: the server starts anyway
        // and serves the rebuilding page until a later build succeeds.
        match build_site(config) {
            Ok(summary) => log!("build"; "{summary}"),
            Err(err) => log!("error"; "initial build failed: {err:#}"),
        }
    }

    check_output_dir(&config.build.output)?;

    let interface: std::net::IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("invalid interface address `{}`", config.serve.interface))?;
    let addr = SocketAddr::new(interface, config.serve.port);
    let server = Arc::new(bind_listener(addr)?);

    // Ctrl+C unblocks the request loop for an ordered shutdown
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("failed to set Ctrl+C handler")?;

    log!("serve"; "http://{addr}");

    let hot_reload = if config.serve.watch {
        start_hot_reload(config)
    } else {
        None
    };

    // Handle requests in main thread (blocks until Ctrl+C)
    for request in server.incoming_requests() {
        handle_request(request, &config.build.output);
    }

    // Ordered shutdown: quiesce the watcher so no new trigger can land,
    // then let the worker drain (an in-flight build plus one parked
    // trigger finish), then the listener closes on drop.
    if let Some((watcher, worker, handle)) = hot_reload {
        watcher.stop();
        drop(handle);
        worker.join();
    }

    log!("serve"; "stopped");
    Ok(())
}

/// Wire watcher → rebuild worker. A watcher setup failure downgrades to
/// serving without hot reload instead of killing the server.
fn start_hot_reload(
    config: &'static SiteConfig,
) -> Option<(ChangeWatcher, RebuildWorker, RebuildHandle)> {
    let (worker, handle) = RebuildWorker::spawn(move || {
        log!("watch"; "rebuilding...");
        match build_site(config) {
            Ok(summary) => log!("build"; "{summary}"),
            Err(err) => log!("error"; "rebuild failed: {err:#}"),
        }
    });

    let trigger = handle.clone();
    match ChangeWatcher::spawn(config, move || trigger.request()) {
        Ok(watcher) => Some((watcher, worker, handle)),
        Err(err) => {
            log!("warn"; "hot reload disabled: {err:#}");
            drop(handle);
            worker.join();
            None
        }
    }
}

/// The output directory must exist before serving; a missing homepage is
/// only worth a warning.
fn check_output_dir(output: &Path) -> Result<()> {
    if !output.is_dir() {
        bail!(
            "build directory {} not found, run `stilo build` first",
            output.display()
        );
    }
    if !output.join("index.html").is_file() {
        log!("warn"; "no index.html in {}, the site has no homepage", output.display());
    }
    Ok(())
}

/// Bind the HTTP listener, with a distinct diagnostic for a port that is
/// already taken.
fn bind_listener(addr: SocketAddr) -> Result<Server> {
    match Server::http(addr) {
        Ok(server) => Ok(server),
        Err(err) => {
            let in_use = err
                .downcast_ref::<io::Error>()
                .is_some_and(|io_err| io_err.kind() == io::ErrorKind::AddrInUse);
            if in_use {
                bail!(
                    "port {} is already in use, pick another with --port",
                    addr.port()
                );
            }
            bail!("failed to bind {addr}: {err}");
        }
    }
}

// ============================================================================
// Request Handling
// ============================================================================

/// What a request resolved to.
///
/// `Unavailable` covers everything from a plainly missing file to a read
/// that failed mid-rebuild; the HTTP layer maps it to the 503 rebuilding
/// page rather than treating I/O errors as control flow.
#[derive(Debug)]
enum ServeOutcome {
    Served {
        body: Vec<u8>,
        content_type: &'static str,
    },
    Listing(String),
    Unavailable,
}

/// Handle a single HTTP request.
///
/// 2xx responses stay quiet; everything else logs the client address and
/// request line.
fn handle_request(request: Request, output: &Path) {
    let outcome = resolve_request(request.url(), output);

    let remote = request
        .remote_addr()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".into());
    let request_line = format!("{} {}", request.method(), request.url());

    let result = match outcome {
        ServeOutcome::Served { body, content_type } => request.respond(
            Response::from_data(body)
                .with_header(Header::from_bytes("Content-Type", content_type).unwrap()),
        ),
        ServeOutcome::Listing(html) => request.respond(
            Response::from_string(html).with_header(
                Header::from_bytes("Content-Type", "text/html; charset=utf-8").unwrap(),
            ),
        ),
        ServeOutcome::Unavailable => {
            log!("serve"; "[{remote}] {request_line} -> 503 rebuilding");
            respond_rebuilding(request)
        }
    };

    if let Err(err) = result {
        log!("serve"; "request error: {err}");
    }
}

/// Resolve a request URL against the build root.
///
/// Resolution order:
/// 1. Exact file match → serve file
/// 2. Directory with index.html → serve index.html
/// 3. Directory without index.html → generate listing
/// 4. Anything else (including read errors) → Unavailable
fn resolve_request(url: &str, output: &Path) -> ServeOutcome {
    // Decode URL-encoded characters (e.g., %20 → space)
    let url_path = urlencoding::decode(url)
        .map(Cow::into_owned)
        .unwrap_or_default();

    // Strip query string (e.g., ?t=123456) before resolving path
    let path_without_query = url_path.split(['?', '#']).next().unwrap_or(&url_path);
    let request_path = path_without_query.trim_matches('/');

    // Plain components only: a crafted `..` must not escape the build root
    let rel = Path::new(request_path);
    if !rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return ServeOutcome::Unavailable;
    }

    let local_path = output.join(rel);

    if local_path.is_file() {
        return read_file(&local_path);
    }

    if local_path.is_dir() {
        let index_path = local_path.join("index.html");
        if index_path.is_file() {
            return read_file(&index_path);
        }
        if let Ok(listing) = directory_listing(&local_path, request_path) {
            return ServeOutcome::Listing(listing);
        }
    }

    ServeOutcome::Unavailable
}

/// Read a file for serving.
///
/// A read failing after `is_file()` succeeded is the mid-rebuild window
/// (file deleted, not yet rewritten); it degrades, never crashes.
fn read_file(path: &Path) -> ServeOutcome {
    match fs::read(path) {
        Ok(body) => ServeOutcome::Served {
            body,
            content_type: guess_content_type(path),
        },
        Err(_) => ServeOutcome::Unavailable,
    }
}

/// Serve the 503 rebuilding placeholder.
///
/// The `Refresh` header plus the embedded reload script keep the browser
/// polling until the rebuild lands.
fn respond_rebuilding(request: Request) -> io::Result<()> {
    let body = REBUILDING_TEMPLATE.replace("{refresh_ms}", &(REFRESH_SECS * 1000).to_string());
    let response = Response::from_string(body)
        .with_status_code(StatusCode(503))
        .with_header(Header::from_bytes("Content-Type", "text/html; charset=utf-8").unwrap())
        .with_header(Header::from_bytes("Refresh", REFRESH_SECS.to_string()).unwrap());
    request.respond(response)
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Directory Listing
// ============================================================================

/// Generate an HTML listing for a directory without an `index.html`.
///
/// Hidden entries are filtered; a parent link is added below the root.
fn directory_listing(dir_path: &Path, request_path: &str) -> io::Result<String> {
    let mut entries: Vec<_> = fs::read_dir(dir_path)?
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let icon = if is_dir { "📁" } else { "📄" };
            let href = if request_path.is_empty() {
                format!("/{name}")
            } else {
                format!("/{request_path}/{name}")
            };
            format!(r#"<li><span class="icon">{icon}</span><a href="{href}">{name}</a></li>"#)
        })
        .collect();
    entries.sort();

    // Generate parent link if not at root
    let parent_link = if request_path.is_empty() {
        String::new()
    } else {
        let parent_path = Path::new(request_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent_href = if parent_path.is_empty() {
            "/".to_string()
        } else {
            format!("/{parent_path}")
        };
        format!(
            r#"<li class="parent"><span class="icon">📂</span><a href="{parent_href}">..</a></li>"#
        )
    };

    #[allow(clippy::literal_string_with_formatting_args)]
    // These are template placeholders, not format args
    Ok(DIRECTORY_TEMPLATE
        .replace("{path}", request_path)
        .replace("{parent_link}", &parent_link)
        .replace("{entries}", &entries.join("\n            ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use tempfile::TempDir;

    // ------------------------------------------------------------------
    // Request resolution
    // ------------------------------------------------------------------

    #[test]
    fn test_resolve_serves_exact_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("style.css"), "body {}").unwrap();

        let ServeOutcome::Served { body, content_type } =
            resolve_request("/style.css", dir.path())
        else {
            panic!("expected Served");
        };
        assert_eq!(body, b"body {}");
        assert_eq!(content_type, "text/css; charset=utf-8");
    }

    #[test]
    fn test_resolve_directory_index() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("about")).unwrap();
        fs::write(dir.path().join("about/index.html"), "<p>about</p>").unwrap();

        let ServeOutcome::Served { body, content_type } =
            resolve_request("/about/", dir.path())
        else {
            panic!("expected Served");
        };
        assert_eq!(body, b"<p>about</p>");
        assert_eq!(content_type, "text/html; charset=utf-8");
    }

    #[test]
    fn test_resolve_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve_request("/gone.html", dir.path()),
            ServeOutcome::Unavailable
        ));
    }

    #[test]
    fn test_resolve_strips_query_string() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.js"), "let x;").unwrap();

        assert!(matches!(
            resolve_request("/app.js?t=12345", dir.path()),
            ServeOutcome::Served { .. }
        ));
    }

    #[test]
    fn test_resolve_decodes_url_encoding() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("my page.html"), "hi").unwrap();

        assert!(matches!(
            resolve_request("/my%20page.html", dir.path()),
            ServeOutcome::Served { .. }
        ));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("build");
        fs::create_dir(&output).unwrap();
        fs::write(dir.path().join("secret.txt"), "secret").unwrap();

        assert!(matches!(
            resolve_request("/../secret.txt", &output),
            ServeOutcome::Unavailable
        ));
        assert!(matches!(
            resolve_request("/%2e%2e/secret.txt", &output),
            ServeOutcome::Unavailable
        ));
    }

    #[test]
    fn test_resolve_directory_without_index_lists() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("posts")).unwrap();
        fs::write(dir.path().join("posts/a.html"), "").unwrap();

        let ServeOutcome::Listing(html) = resolve_request("/posts", dir.path()) else {
            panic!("expected Listing");
        };
        assert!(html.contains("a.html"));
        assert!(html.contains(".."));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(
            guess_content_type(Path::new("x.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(guess_content_type(Path::new("x.png")), "image/png");
        assert_eq!(
            guess_content_type(Path::new("x.unknown")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_rebuilding_template_embeds_refresh() {
        let body = REBUILDING_TEMPLATE.replace("{refresh_ms}", "2000");
        assert!(body.contains("2000"));
        assert!(body.to_lowercase().contains("rebuild"));
    }

    // ------------------------------------------------------------------
    // Rebuild worker: single-slot coalescing
    // ------------------------------------------------------------------

    #[test]
    fn test_rebuild_worker_runs_once_per_trigger() {
        let (started_tx, started_rx) = channel();
        let (worker, handle) = RebuildWorker::spawn(move || {
            started_tx.send(()).unwrap();
        });

        handle.request();
        started_rx.recv().unwrap();

        drop(handle);
        worker.join();
        // No further runs after the single trigger
        assert!(started_rx.try_recv().is_err());
    }

    #[test]
    fn test_rebuild_worker_coalesces_burst_into_one_followup() {
        let (started_tx, started_rx) = channel();
        let (gate_tx, gate_rx) = channel::<()>();
        let gate_rx = std::sync::Mutex::new(gate_rx);

        let (worker, handle) = RebuildWorker::spawn(move || {
            started_tx.send(()).unwrap();
            gate_rx.lock().unwrap().recv().unwrap();
        });

        // First trigger starts a build that blocks on the gate
        handle.request();
        started_rx.recv().unwrap();

        // Burst while the build is in flight: one parks, the rest coalesce
        for _ in 0..5 {
            handle.request();
        }

        gate_tx.send(()).unwrap(); // finish build 1
        started_rx.recv().unwrap(); // the single follow-up build starts
        gate_tx.send(()).unwrap(); // finish build 2

        drop(handle);
        worker.join();

        // Exactly two runs total: the in-flight build plus one follow-up
        assert!(started_rx.try_recv().is_err());
    }
}
