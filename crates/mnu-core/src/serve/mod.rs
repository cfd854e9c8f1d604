//! Singleton vault backend and its advertisement socket.
//!
//! One long-running `mnu serve` starts the HTTP backend (`bw serve` by default)
//! on a free loopback port and advertises its base URL on a Unix socket in the
//! state directory. Every connection to the socket receives the URL followed by
//! a newline. Other invocations discover the backend with
//! [`find_advertised`] and fall back to a private backend from [`start`] when
//! nothing answers.
//!
//! Socket ownership is decided by the bind itself: a file left behind by a
//! dead advertiser is removed only after a connect to it fails, and a short
//! advisory lock serializes the check-then-bind step between racing servers.
//!
//! [`start`]: ServiceAdvertiser::start

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::lock::AppLock;
use crate::state::StateDir;

/// Path polled on the backend to decide readiness.
pub const HEALTH_PATH: &str = "/status";

/// Lock held while claiming the advertisement socket.
pub const ADVERTISE_LOCK_NAME: &str = "serve.lock";

/// Timing knobs for starting and discovering a backend.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Overall deadline for the backend to answer its health check
    pub ready_timeout: Duration,
    /// Delay between health checks
    pub poll_interval: Duration,
    /// Deadline for connecting to and reading from the advertisement socket
    pub discovery_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            discovery_timeout: Duration::from_millis(200),
        }
    }
}

/// Program and arguments used to launch the backend.
///
/// `--port <port>` is appended to the arguments at launch time.
#[derive(Debug, Clone)]
pub struct BackendCommand {
    program: String,
    args: Vec<String>,
}

impl BackendCommand {
    /// Arbitrary backend command.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `<program> serve --hostname 127.0.0.1`, the Bitwarden CLI's REST server.
    pub fn bitwarden(program: impl Into<String>) -> Self {
        Self::new(program, ["serve", "--hostname", "127.0.0.1"])
    }

    /// Program name.
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for BackendCommand {
    fn default() -> Self {
        Self::bitwarden("bw")
    }
}

/// A running backend. The process is killed when this is dropped.
#[derive(Debug)]
pub struct BackendProcess {
    url: String,
    child: Child,
}

impl BackendProcess {
    /// Base URL, `http://127.0.0.1:<port>`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop the backend and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Failed to stop backend: {}", e);
        } else {
            tracing::debug!(url = %self.url, "Backend stopped");
        }
    }
}

/// Starts, advertises and discovers the vault backend.
#[derive(Debug, Clone)]
pub struct ServiceAdvertiser {
    state: StateDir,
    backend: BackendCommand,
    options: ServeOptions,
}

impl ServiceAdvertiser {
    /// Advertiser for `backend` with default timings.
    pub fn new(state: StateDir, backend: BackendCommand) -> Self {
        Self {
            state,
            backend,
            options: ServeOptions::default(),
        }
    }

    /// Replace the timing options.
    #[must_use]
    pub fn with_options(mut self, options: ServeOptions) -> Self {
        self.options = options;
        self
    }

    /// Launch a private backend and wait until it answers [`HEALTH_PATH`].
    ///
    /// # Errors
    ///
    /// - [`Error::ProcessSpawn`] if the backend cannot be launched
    /// - [`Error::Backend`] if it exits before becoming healthy
    /// - [`Error::ServiceTimeout`] if it is not healthy within the deadline
    pub async fn start(&self) -> Result<BackendProcess> {
        let port = reserve_port()?;
        let url = format!("http://127.0.0.1:{port}");

        let child = Command::new(&self.backend.program)
            .args(&self.backend.args)
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ProcessSpawn {
                program: self.backend.program.clone(),
                source: e,
            })?;
        tracing::debug!(pid = ?child.id(), url = %url, "Backend spawned");

        let mut backend = BackendProcess { url, child };
        self.wait_ready(&mut backend).await?;
        tracing::info!(url = %backend.url, "Backend ready");
        Ok(backend)
    }

    async fn wait_ready(&self, backend: &mut BackendProcess) -> Result<()> {
        let client = health_client()?;
        let deadline = Instant::now() + self.options.ready_timeout;

        loop {
            if is_healthy(&client, &backend.url).await {
                return Ok(());
            }
            if let Some(status) = backend.child.try_wait()? {
                return Err(Error::Backend(format!(
                    "{} exited before becoming ready ({status})",
                    self.backend.program
                )));
            }
            if Instant::now() >= deadline {
                return Err(Error::ServiceTimeout {
                    url: backend.url.clone(),
                    secs: self.options.ready_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// URL advertised by a running `serve`, if any.
    pub async fn find_advertised(&self) -> Option<String> {
        find_advertised_at(&self.state.advertise_socket(), self.options.discovery_timeout).await
    }

    /// Start the backend, advertise it and serve until `shutdown` completes.
    ///
    /// The socket is removed and the backend stopped on return.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyAdvertised`] if another live server owns the socket
    /// - any error from [`ServiceAdvertiser::start`]
    /// - I/O errors from binding or accepting
    pub async fn run_advertiser(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let backend = self.start().await?;
        let service = AdvertisedService::bind(&self.state, backend.url(), &self.options).await?;
        tracing::info!(
            url = %backend.url(),
            socket = %service.path().display(),
            "Advertising backend"
        );

        let result = service.serve_until(shutdown).await;
        backend.shutdown().await;
        result
    }
}

/// A bound advertisement socket. The socket file is removed on drop.
#[derive(Debug)]
pub struct AdvertisedService {
    path: PathBuf,
    url: String,
    listener: UnixListener,
}

impl AdvertisedService {
    /// Claim the state directory's advertisement socket for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyAdvertised`] if a live server owns the socket
    /// or another server is claiming it right now.
    pub async fn bind(state: &StateDir, url: &str, options: &ServeOptions) -> Result<Self> {
        let path = state.advertise_socket();
        let claim = match AppLock::acquire(state, ADVERTISE_LOCK_NAME) {
            Ok(lock) => lock,
            Err(e) if e.is_lock_contention() => return Err(Error::AlreadyAdvertised { path }),
            Err(e) => return Err(e),
        };

        remove_if_stale(&path, options.discovery_timeout).await?;
        let listener = match UnixListener::bind(&path) {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                return Err(Error::AlreadyAdvertised { path });
            }
            Err(e) => return Err(e.into()),
        };
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        drop(claim);

        Ok(Self {
            path,
            url: url.to_string(),
            listener,
        })
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Answer every connection with the URL until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting a connection fails.
    pub async fn serve_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutting down advertiser");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, _) = accepted?;
                    let line = format!("{}\n", self.url);
                    tokio::spawn(async move {
                        if let Err(e) = answer(stream, line).await {
                            tracing::debug!("Advertisement write failed: {}", e);
                        }
                    });
                }
            }
        }
    }
}

impl Drop for AdvertisedService {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

async fn answer(mut stream: UnixStream, line: String) -> std::io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.shutdown().await
}

/// Read the URL advertised on the socket at `path`.
///
/// Returns `None` when the socket is missing, nobody answers within
/// `timeout` or the answer is empty.
pub async fn find_advertised_at(path: &Path, timeout: Duration) -> Option<String> {
    let lookup = async {
        let stream = UnixStream::connect(path).await.ok()?;
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).await.ok()?;
        let url = line.trim();
        (!url.is_empty()).then(|| url.to_string())
    };

    match tokio::time::timeout(timeout, lookup).await {
        Ok(found) => found,
        Err(_) => {
            tracing::debug!(socket = %path.display(), "Advertisement lookup timed out");
            None
        }
    }
}

async fn remove_if_stale(path: &Path, timeout: Duration) -> Result<()> {
    if std::fs::symlink_metadata(path).is_err() {
        return Ok(());
    }

    let live = matches!(
        tokio::time::timeout(timeout, UnixStream::connect(path)).await,
        Ok(Ok(_))
    );
    if live {
        return Err(Error::AlreadyAdvertised {
            path: path.to_path_buf(),
        });
    }

    tracing::debug!(socket = %path.display(), "Removing stale advertisement socket");
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn reserve_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn health_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .map_err(|e| Error::Backend(format!("failed to build HTTP client: {e}")))
}

/// Whether `GET <url>/status` answers with a success status.
pub async fn is_healthy(client: &reqwest::Client, url: &str) -> bool {
    client
        .get(format!("{url}{HEALTH_PATH}"))
        .send()
        .await
        .is_ok_and(|response| response.status().is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn fast_options() -> ServeOptions {
        ServeOptions {
            ready_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            discovery_timeout: Duration::from_millis(200),
        }
    }

    async fn http_ok_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                    .await;
            }
        });
        url
    }

    #[tokio::test]
    async fn test_find_without_socket_is_none() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path()).unwrap();
        let advertiser = ServiceAdvertiser::new(state, BackendCommand::default());

        assert!(advertiser.find_advertised().await.is_none());
    }

    #[tokio::test]
    async fn test_bind_then_find() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path()).unwrap();
        let options = fast_options();

        let service = AdvertisedService::bind(&state, "http://127.0.0.1:8087", &options)
            .await
            .unwrap();
        let mode = std::fs::metadata(service.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(service.serve_until(async {
            let _ = stop_rx.await;
        }));

        let found = find_advertised_at(&state.advertise_socket(), options.discovery_timeout).await;
        assert_eq!(found.as_deref(), Some("http://127.0.0.1:8087"));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert!(!state.advertise_socket().exists());
    }

    #[tokio::test]
    async fn test_second_bind_is_rejected_while_live() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path()).unwrap();
        let options = fast_options();

        let _first = AdvertisedService::bind(&state, "http://127.0.0.1:1", &options)
            .await
            .unwrap();
        let second = AdvertisedService::bind(&state, "http://127.0.0.1:2", &options).await;

        assert!(matches!(second, Err(Error::AlreadyAdvertised { .. })));
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path()).unwrap();
        let socket = state.advertise_socket();

        drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());
        assert!(socket.exists());
        assert!(find_advertised_at(&socket, Duration::from_millis(100)).await.is_none());

        let service = AdvertisedService::bind(&state, "http://127.0.0.1:3", &fast_options()).await;
        assert!(service.is_ok());
    }

    #[tokio::test]
    async fn test_health_check() {
        let client = health_client().unwrap();
        let url = http_ok_server().await;
        assert!(is_healthy(&client, &url).await);

        let closed = format!("http://127.0.0.1:{}", reserve_port().unwrap());
        assert!(!is_healthy(&client, &closed).await);
    }

    #[tokio::test]
    async fn test_start_times_out_on_silent_backend() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path()).unwrap();
        // Appended `--port N` become positional parameters of the script.
        let backend = BackendCommand::new("sh", ["-c", "sleep 5", "sh"]);
        let advertiser = ServiceAdvertiser::new(state, backend).with_options(fast_options());

        let err = advertiser.start().await.unwrap_err();
        assert!(matches!(err, Error::ServiceTimeout { .. }));
    }

    #[tokio::test]
    async fn test_start_reports_early_exit() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path()).unwrap();
        let advertiser = ServiceAdvertiser::new(state, BackendCommand::new("true", Vec::<String>::new()))
            .with_options(ServeOptions {
                ready_timeout: Duration::from_secs(5),
                ..fast_options()
            });

        let err = advertiser.start().await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[tokio::test]
    async fn test_start_missing_program() {
        let temp = tempfile::tempdir().unwrap();
        let state = StateDir::at(temp.path()).unwrap();
        let advertiser = ServiceAdvertiser::new(
            state,
            BackendCommand::new("/nonexistent/mnu-backend", Vec::<String>::new()),
        );

        let err = advertiser.start().await.unwrap_err();
        assert!(matches!(err, Error::ProcessSpawn { .. }));
    }
}
