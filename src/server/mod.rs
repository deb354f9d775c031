//! # Service Layer
//!
//! The three request surfaces the RPC transport binds to, and the
//! [`Engine`] façade that owns what they share: the catalogue and the
//! worker pool. The transport itself (sockets, TLS, the protobuf wire
//! schema) lives outside this crate; services speak plain request and
//! response types and report failures as `eyre` reports whose typed
//! kinds the boundary maps to status codes via [`crate::error::status_of`].
//!
//! | Service | Operations |
//! |---|---|
//! | [`DdlService`] | schema/entity/index definition and listing |
//! | [`DmlService`] | row insertion, single and batched |
//! | [`DqlService`] | query execution with chunked results, ping |

pub mod ddl;
pub mod dml;
pub mod dql;

use std::sync::Arc;

use eyre::Result;
use tracing::info;

use crate::catalog::Catalogue;
use crate::config::ServerConfig;
use crate::exec::WorkerPool;

pub use ddl::{DdlService, EntityDetails};
pub use dml::DmlService;
pub use dql::{DqlService, KnnSpec, ProjectionElement, QueryRequest};

/// Single-process engine: catalogue plus worker pool under one config.
pub struct Engine {
    config: ServerConfig,
    catalogue: Arc<Catalogue>,
    pool: Arc<WorkerPool>,
}

impl Engine {
    /// Validates the configuration, opens the catalogue under its data
    /// directory, and starts the worker pool.
    pub fn start(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let catalogue = Catalogue::open(&config.root, &Catalogue::store_options(&config))?;
        let pool = Arc::new(WorkerPool::from_config(&config));
        info!(
            root = %config.root.display(),
            port = config.port,
            "engine started"
        );
        Ok(Self {
            config,
            catalogue,
            pool,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.catalogue
    }

    pub fn ddl(&self) -> DdlService {
        DdlService::new(Arc::clone(&self.catalogue))
    }

    pub fn dml(&self) -> DmlService {
        DmlService::new(Arc::clone(&self.catalogue))
    }

    pub fn dql(&self) -> DqlService {
        DqlService::new(
            Arc::clone(&self.catalogue),
            Arc::clone(&self.pool),
            self.config.message_size,
        )
    }

    /// Closes the catalogue subtree. The pool drains as it drops.
    pub fn shutdown(&self) {
        self.catalogue.close();
        info!("engine stopped");
    }
}
