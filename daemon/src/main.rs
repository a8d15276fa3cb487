//! Restomod Daemon (restomodd)
//!
//! Long-running service providing:
//! - Vehicle and part research with a shared in-memory cache
//! - Configurator sessions (select, regenerate, reset)
//! - Image resolution (embedded, generated or curated fallback)
//!
//! Architecture:
//! - Unix socket listener at ~/.restomod/restomod.sock
//! - JSON-lines messages (IpcMessage/IpcResponse)
//! - One controller actor per named session

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

mod cache;
mod config;
mod controller;
mod handlers;
mod imagegen;
mod research;
mod server;

use cache::ResearchCache;
use config::DaemonConfig;
use controller::{ConfiguratorController, ConfiguratorHandle, ImageObserver};
use imagegen::{ImageClient, ImageError, ImageSource};
use research::ResearchClient;
use restomod_core::{restomod_home, FallbackImageResolver, FallbackImageTable, IpcMessage, IpcResponse};

/// Global state for the daemon.
pub struct DaemonState {
    /// When the daemon started
    start_time: Instant,

    /// Shutdown signal
    shutdown: AtomicBool,
    shutdown_notify: Notify,

    /// Path to the restomod home directory
    restomod_home: PathBuf,

    pub config: DaemonConfig,

    /// Research cache shared by every session
    pub cache: ResearchCache,

    /// Image generator (None when no endpoint is configured)
    pub images: Option<Arc<dyn ImageSource>>,

    pub resolver: FallbackImageResolver,

    /// Configurator sessions by name, created on first use
    sessions: Mutex<HashMap<String, ConfiguratorHandle>>,
}

impl DaemonState {
    /// Create a new daemon state instance.
    ///
    /// # Errors
    /// Returns `anyhow::Error` if the home directory or HTTP clients cannot
    /// be set up.
    pub fn new() -> anyhow::Result<Self> {
        let restomod_home = restomod_home();
        std::fs::create_dir_all(&restomod_home)?;

        let config = DaemonConfig::load(&restomod_home);

        let table = match FallbackImageTable::load_or_builtin(&restomod_home) {
            Ok(table) => table,
            Err(e) => {
                warn!("Invalid fallback image table, using built-in: {}", e);
                FallbackImageTable::builtin()
            }
        };
        let resolver = FallbackImageResolver::new(Arc::new(table));

        let research = ResearchClient::new(&config.research)?;
        info!("Research endpoint: {}", research.endpoint());
        let cache = ResearchCache::new(Arc::new(research));

        let images: Option<Arc<dyn ImageSource>> = match ImageClient::new(&config.images) {
            Ok(client) => {
                info!("Image generation enabled ({})", client.endpoint());
                Some(Arc::new(client))
            }
            Err(ImageError::NotConfigured) => {
                info!("Image generation disabled, using curated images only");
                None
            }
            Err(e) => {
                warn!("Failed to set up image generation: {}", e);
                None
            }
        };

        Ok(Self::with_parts(restomod_home, config, cache, images, resolver))
    }

    fn with_parts(
        restomod_home: PathBuf,
        config: DaemonConfig,
        cache: ResearchCache,
        images: Option<Arc<dyn ImageSource>>,
        resolver: FallbackImageResolver,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            restomod_home,
            config,
            cache,
            images,
            resolver,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Handle for the named session, spawning it on first use.
    pub fn session(&self, name: &str) -> ConfiguratorHandle {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Starting configurator session '{}'", name);
                let session = name.to_string();
                let observer: ImageObserver = Arc::new(move |url: &str| {
                    info!("Image loaded for session '{}': {}", session, url);
                });
                ConfiguratorController::spawn(
                    self.cache.clone(),
                    self.images.clone(),
                    self.resolver.clone(),
                    Some(observer),
                )
            })
            .clone()
    }

    /// Handle for the named session if it exists.
    pub fn existing_session(&self, name: &str) -> Option<ConfiguratorHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Take the named session out of the map. The actor stops once the
    /// returned handle and any in-flight clones are dropped.
    pub fn remove_session(&self, name: &str) -> Option<ConfiguratorHandle> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        if removed.is_some() {
            debug!("Closing configurator session '{}'", name);
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check whether a shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Request a graceful shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_one();
    }

    /// Resolves once a shutdown has been requested.
    pub async fn shutdown_requested(&self) {
        if self.should_shutdown() {
            return;
        }
        self.shutdown_notify.notified().await;
    }

    /// Get the path to the daemon socket.
    pub fn socket_path(&self) -> PathBuf {
        self.restomod_home.join("restomod.sock")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("restomodd=info".parse()?),
        )
        .init();

    info!("Starting restomodd v{}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(DaemonState::new()?);

    // Remove stale socket
    let socket_path = state.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    // Start the server
    server::run(state).await
}

/// Handle a single client connection
async fn handle_client(mut stream: tokio::net::UnixStream, state: Arc<DaemonState>) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<IpcMessage>(&line) {
            Ok(msg) => handlers::handle_message(msg, &state).await,
            Err(e) => {
                warn!("Invalid message: {}", e);
                IpcResponse::Error(format!("Invalid message: {}", e))
            }
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;

        line.clear();
    }

    Ok(())
}
