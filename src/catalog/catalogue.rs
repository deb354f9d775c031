//! # Catalogue
//!
//! The persistent root of the namespace. `catalogue.db` under the data
//! directory holds the catalog header at record 1 (timestamps, schema
//! count, schema descriptor record-ids) and one descriptor record per
//! schema. At open the header is read, every schema is loaded, and each
//! schema's on-disk folder is verified to exist: a missing folder is
//! corruption and fails the open.
//!
//! The in-memory registry mirrors the persistent state and is guarded by
//! a read-write lock: enumeration and lookup under read, create/drop
//! under write. Every mutation updates the persistent header inside the
//! same committed batch as the descriptor change; on failure the store
//! rolls back and the partial folder is deleted, leaving the registry
//! untouched.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::catalog::meta::{CatalogHeader, CatalogHeaderSer, Descriptor, DescriptorSer};
use crate::catalog::schema::Schema;
use crate::config::ServerConfig;
use crate::error::DbError;
use crate::storage::{RecordStore, StoreOptions, HEADER_RECORD_ID};
use crate::types::Name;

pub const CATALOGUE_STORE_FILE: &str = "catalogue.db";

struct SchemaEntry {
    recid: u64,
    schema: Arc<Schema>,
}

/// Root registry of schemas.
pub struct Catalogue {
    root: PathBuf,
    store: Mutex<RecordStore>,
    registry: RwLock<HashMap<String, SchemaEntry>>,
    opts: StoreOptions,
    closed: AtomicBool,
}

impl Catalogue {
    /// Store options derived from server configuration.
    pub fn store_options(config: &ServerConfig) -> StoreOptions {
        StoreOptions {
            lock_timeout: config.lock_timeout,
            volume_kind: config.volume_kind,
        }
    }

    /// Opens (or initializes) the catalogue under `root`.
    pub fn open(root: &Path, opts: &StoreOptions) -> Result<Arc<Self>> {
        std::fs::create_dir_all(root).map_err(|e| DbError::StorageIo {
            path: root.to_path_buf(),
            source: e,
        })?;
        let store_path = root.join(CATALOGUE_STORE_FILE);
        let mut store = RecordStore::open(&store_path, opts)
            .wrap_err_with(|| format!("failed to open catalogue at '{}'", store_path.display()))?;

        let header = match store.get(HEADER_RECORD_ID, &CatalogHeaderSer)? {
            Some(header) => header,
            None => {
                // fresh data directory
                let header = CatalogHeader::new();
                let recid = store.put(&header, &CatalogHeaderSer)?;
                eyre::ensure!(
                    recid == HEADER_RECORD_ID,
                    "fresh catalogue allocated header at record {}",
                    recid
                );
                store.commit()?;
                header
            }
        };

        let mut registry = HashMap::new();
        for recid in &header.entries {
            let descriptor = store
                .get(*recid, &DescriptorSer)?
                .ok_or_else(|| DbError::StorageCorruption {
                    path: store_path.clone(),
                    detail: format!("dangling schema descriptor record {}", recid),
                })?;
            let folder = root.join(format!("schema_{}", descriptor.name));
            if !folder.is_dir() {
                return Err(DbError::StorageCorruption {
                    path: folder,
                    detail: format!("schema folder for '{}' is missing", descriptor.name),
                }
                .into());
            }
            let schema = Schema::open(root, Name::Simple(descriptor.name.clone()), opts)
                .wrap_err_with(|| format!("loading schema '{}'", descriptor.name))?;
            registry.insert(
                descriptor.name,
                SchemaEntry {
                    recid: *recid,
                    schema,
                },
            );
        }

        info!(
            root = %root.display(),
            schemas = registry.len(),
            "catalogue opened"
        );
        Ok(Arc::new(Self {
            root: root.to_path_buf(),
            store: Mutex::new(store),
            registry: RwLock::new(registry),
            opts: opts.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DbError::TxDboClosed {
                name: "catalogue".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Schema names currently registered.
    pub fn list_schemas(&self) -> Result<Vec<Name>> {
        self.check_open()?;
        let registry = self.registry.read();
        Ok(registry.keys().map(|n| Name::Simple(n.clone())).collect())
    }

    pub fn schema(&self, name: &str) -> Result<Arc<Schema>> {
        self.check_open()?;
        let registry = self.registry.read();
        registry
            .get(name)
            .map(|e| Arc::clone(&e.schema))
            .ok_or_else(|| {
                DbError::SchemaDoesNotExist {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Creates a schema. Requires a simple name; duplicates are rejected
    /// under the registry write lock, so a concurrent create of the same
    /// name fails with `SchemaAlreadyExists`.
    pub fn create_schema(&self, name: &Name) -> Result<Arc<Schema>> {
        self.check_open()?;
        if !name.is_simple() {
            return Err(DbError::SimpleNameRequired {
                name: name.to_string(),
            }
            .into());
        }
        let mut registry = self.registry.write();
        if registry.contains_key(name.leaf()) {
            return Err(DbError::SchemaAlreadyExists {
                name: name.to_string(),
            }
            .into());
        }

        let folder = self.root.join(format!("schema_{}", name.leaf()));
        let created = (|| -> Result<(u64, Arc<Schema>)> {
            let schema = Schema::create(&self.root, name.clone(), &self.opts)?;
            let mut store = self.store.lock();
            let recid = store.put(&Descriptor::schema(name.leaf()), &DescriptorSer)?;
            let mut header = Self::read_header(&store)?;
            header.push_entry(recid);
            store.update(HEADER_RECORD_ID, &header, &CatalogHeaderSer)?;
            store.commit()?;
            Ok((recid, schema))
        })();

        match created {
            Ok((recid, schema)) => {
                registry.insert(
                    name.leaf().to_string(),
                    SchemaEntry {
                        recid,
                        schema: Arc::clone(&schema),
                    },
                );
                info!(schema = %name, "schema registered");
                Ok(schema)
            }
            Err(e) => {
                if let Err(rollback_err) = self.store.lock().rollback() {
                    warn!(error = %rollback_err, "catalogue rollback failed");
                }
                if folder.exists() {
                    let _ = std::fs::remove_dir_all(&folder);
                }
                Err(e)
            }
        }
    }

    /// Drops a schema: removes its catalog entry, rewrites the header,
    /// commits, then closes the schema and recursively deletes the
    /// folder. The schema stays open and registered when the store
    /// mutation fails, so a failed drop leaves it fully usable.
    pub fn drop_schema(&self, name: &Name) -> Result<()> {
        self.check_open()?;
        let mut registry = self.registry.write();
        let entry = registry
            .get(name.leaf())
            .ok_or_else(|| DbError::SchemaDoesNotExist {
                name: name.to_string(),
            })?;
        let recid = entry.recid;
        let schema = Arc::clone(&entry.schema);

        {
            let mut store = self.store.lock();
            let outcome = (|| -> Result<()> {
                store.delete(recid)?;
                let mut header = Self::read_header(&store)?;
                header.remove_entry(recid);
                store.update(HEADER_RECORD_ID, &header, &CatalogHeaderSer)?;
                store.commit()
            })();
            if let Err(e) = outcome {
                if let Err(rollback_err) = store.rollback() {
                    warn!(error = %rollback_err, "catalogue rollback failed");
                }
                return Err(e);
            }
        }

        schema.close();
        registry.remove(name.leaf());
        let folder = self.root.join(format!("schema_{}", name.leaf()));
        if folder.exists() {
            std::fs::remove_dir_all(&folder).map_err(|e| DbError::StorageIo {
                path: folder,
                source: e,
            })?;
        }
        info!(schema = %name, "schema dropped");
        Ok(())
    }

    fn read_header(store: &RecordStore) -> Result<CatalogHeader> {
        store
            .get(HEADER_RECORD_ID, &CatalogHeaderSer)?
            .ok_or_else(|| {
                DbError::StorageCorruption {
                    path: store.path().to_path_buf(),
                    detail: "missing catalogue header record".into(),
                }
                .into()
            })
    }

    /// Closes the catalogue and the whole subtree. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let registry = self.registry.read();
            for entry in registry.values() {
                entry.schema.close();
            }
            info!("catalogue closed");
        }
    }
}

impl std::fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalogue")
            .field("root", &self.root)
            .field("schemas", &self.registry.read().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
