//! # Server Configuration
//!
//! Runtime options recognized by the engine. Parsing a configuration file
//! and wiring the TCP transport happen in the (out-of-scope) bootstrap;
//! this module only defines the validated option set and its defaults.
//!
//! ## Options
//!
//! | Option | Default | Meaning |
//! |---|---|---|
//! | `port` | 1865 | TCP port the transport binds |
//! | `core_threads` | 2 | workers kept alive permanently |
//! | `max_threads` | 8 | upper bound of the worker pool |
//! | `keep_alive` | 500ms | idle lifetime of surplus workers |
//! | `message_size` | 4 MiB | message and stream-chunk byte ceiling |
//! | `use_tls` | false | requires `cert_file` and `private_key` |
//! | `root` | `./data` | data directory |
//! | `lock_timeout` | 1000ms | wait for the store file lock on open |
//! | `volume_kind` | Mmap | read-volume backing (mmap vs heap) |

use std::path::PathBuf;
use std::time::Duration;

use eyre::{ensure, Result};

/// Backing for a store's read volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    /// Memory-mapped file (zero-copy reads).
    Mmap,
    /// Heap-buffered positional reads.
    Heap,
}

/// Validated engine configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub core_threads: usize,
    pub max_threads: usize,
    pub keep_alive: Duration,
    pub message_size: usize,
    pub use_tls: bool,
    pub cert_file: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub root: PathBuf,
    pub lock_timeout: Duration,
    pub volume_kind: VolumeKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1865,
            core_threads: 2,
            max_threads: 8,
            keep_alive: Duration::from_millis(500),
            message_size: 4 * 1024 * 1024,
            use_tls: false,
            cert_file: None,
            private_key: None,
            root: PathBuf::from("./data"),
            lock_timeout: Duration::from_millis(1000),
            volume_kind: VolumeKind::Mmap,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.core_threads >= 1, "core_threads must be at least 1");
        ensure!(
            self.max_threads >= self.core_threads,
            "max_threads ({}) must be >= core_threads ({})",
            self.max_threads,
            self.core_threads
        );
        ensure!(
            self.message_size >= 1024,
            "message_size must be at least 1024 bytes"
        );
        if self.use_tls {
            ensure!(
                self.cert_file.is_some() && self.private_key.is_some(),
                "use_tls requires both cert_file and private_key"
            );
        }
        Ok(())
    }
}

/// Fluent builder over [`ServerConfig`].
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn core_threads(mut self, n: usize) -> Self {
        self.config.core_threads = n;
        self
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.config.max_threads = n;
        self
    }

    pub fn keep_alive(mut self, d: Duration) -> Self {
        self.config.keep_alive = d;
        self
    }

    pub fn message_size(mut self, bytes: usize) -> Self {
        self.config.message_size = bytes;
        self
    }

    pub fn tls(mut self, cert_file: PathBuf, private_key: PathBuf) -> Self {
        self.config.use_tls = true;
        self.config.cert_file = Some(cert_file);
        self.config.private_key = Some(private_key);
        self
    }

    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root = path.into();
        self
    }

    pub fn lock_timeout(mut self, d: Duration) -> Self {
        self.config.lock_timeout = d;
        self
    }

    pub fn volume_kind(mut self, kind: VolumeKind) -> Self {
        self.config.volume_kind = kind;
        self
    }

    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
