//! Live-reload development server.
//!
//! A minimal static file server over `tokio::net`. HTML responses get a small
//! script that polls `/__kiln/version` and reloads the page when the value
//! changes; the watch loop bumps the version after every successful pass.

use super::ToolError;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Path polled by the injected reload script.
pub const VERSION_PATH: &str = "/__kiln/version";

const RELOAD_SCRIPT: &str = r#"<script>
(function () {
  var current = null;
  setInterval(function () {
    fetch("/__kiln/version").then(function (r) { return r.text(); }).then(function (v) {
      if (current !== null && v !== current) { location.reload(); }
      current = v;
    }).catch(function () {});
  }, 1000);
})();
</script>"#;

const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Static file server for the build output.
#[derive(Debug, Clone)]
pub struct DevServer {
    root: PathBuf,
    host: String,
    port: u16,
}

impl DevServer {
    pub fn new(root: impl Into<PathBuf>, host: impl Into<String>, port: u16) -> Self {
        Self { root: root.into(), host: host.into(), port }
    }

    /// Bind and start serving in a background task.
    ///
    /// Fails with [`ToolError::RootMissing`] if the served root does not exist.
    pub async fn start(self) -> Result<DevServerHandle, ToolError> {
        if !self.root.is_dir() {
            return Err(ToolError::RootMissing(self.root));
        }

        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| ToolError::io(&self.root, e))?;
        let addr = listener.local_addr().map_err(|e| ToolError::io(&self.root, e))?;
        info!("dev server listening on http://{} (root {})", addr, self.root.display());

        let version = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let root = Arc::new(self.root);
        let served_version = Arc::clone(&version);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let root = Arc::clone(&root);
                            let version = Arc::clone(&served_version);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &root, &version).await {
                                    debug!("connection from {} failed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => warn!("accept failed: {}", e),
                    },
                }
            }
        });

        Ok(DevServerHandle { addr, version, shutdown: Some(shutdown_tx), task })
    }
}

/// Running server.
#[derive(Debug)]
pub struct DevServerHandle {
    addr: SocketAddr,
    version: Arc<AtomicU64>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl DevServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared counter served at [`VERSION_PATH`].
    pub fn version(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.version)
    }

    /// Tell connected pages to reload.
    pub fn notify_reload(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    root: &Path,
    version: &AtomicU64,
) -> std::io::Result<()> {
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_REQUEST_HEAD {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }

    let request = String::from_utf8_lossy(&head);
    let mut parts = request.lines().next().unwrap_or_default().split_whitespace();
    let (method, target) = (parts.next().unwrap_or_default(), parts.next().unwrap_or("/"));

    let response = if method != "GET" && method != "HEAD" {
        Response::text(405, "Method Not Allowed", "method not allowed")
    } else {
        let raw = target.split(['?', '#']).next().unwrap_or("/");
        match urlencoding::decode(raw) {
            Ok(path) if path == VERSION_PATH => {
                Response::text(200, "OK", &version.load(Ordering::SeqCst).to_string())
            }
            Ok(path) => serve_file(root, &path).await,
            Err(_) => Response::text(400, "Bad Request", "path is not valid UTF-8"),
        }
    };

    stream.write_all(&response.into_bytes(method == "HEAD")).await?;
    stream.shutdown().await
}

async fn serve_file(root: &Path, url_path: &str) -> Response {
    let Some(mut path) = map_url(root, url_path) else {
        return Response::text(403, "Forbidden", "forbidden");
    };
    if path.is_dir() {
        path = path.join("index.html");
    }

    match tokio::fs::read(&path).await {
        Ok(body) => {
            let content_type = content_type(&path);
            let body = if content_type.starts_with("text/html") {
                inject_reload_script(&String::from_utf8_lossy(&body)).into_bytes()
            } else {
                body
            };
            Response { status: 200, reason: "OK", content_type, body }
        }
        Err(_) => Response::text(404, "Not Found", "not found"),
    }
}

/// Map a URL path below `root`. Returns `None` for paths escaping the root.
fn map_url(root: &Path, url_path: &str) -> Option<PathBuf> {
    let relative = Path::new(url_path.trim_start_matches('/'));
    let mut mapped = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => mapped.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(mapped)
}

/// Insert the reload script before `</body>`, or append it.
pub fn inject_reload_script(html: &str) -> String {
    match html.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], RELOAD_SCRIPT, &html[idx..]),
        None => format!("{}{}", html, RELOAD_SCRIPT),
    }
}

fn content_type(path: &Path) -> &'static str {
    let ext = path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

struct Response {
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    fn text(status: u16, reason: &'static str, body: &str) -> Self {
        Self { status, reason, content_type: "text/plain; charset=utf-8", body: body.as_bytes().to_vec() }
    }

    fn into_bytes(self, head_only: bool) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        )
        .into_bytes();
        if !head_only {
            out.extend_from_slice(&self.body);
        }
        out
    }
}
