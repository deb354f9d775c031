//! # Schemas
//!
//! A schema is a named set of entities with its own catalog store
//! (`schema_<name>/catalogue.db`). Record 1 is the schema header listing
//! entity descriptor record-ids in creation order; every other record is
//! one entity descriptor carrying the entity name and its ordered column
//! names.
//!
//! The in-memory entity registry is guarded by a read-write lock:
//! enumeration and lookup under read, create/drop under write. Store
//! mutations happen inside the write section, and a storage failure rolls
//! back both the store and any partially created entity folder.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::catalog::entity::Entity;
use crate::catalog::meta::{CatalogHeader, CatalogHeaderSer, Descriptor, DescriptorSer};
use crate::error::DbError;
use crate::storage::{RecordStore, StoreOptions, HEADER_RECORD_ID};
use crate::types::{ColumnDef, Name};

pub const SCHEMA_STORE_FILE: &str = "catalogue.db";

struct EntityEntry {
    recid: u64,
    entity: Arc<Entity>,
}

/// A named container of entities.
pub struct Schema {
    name: Name,
    path: PathBuf,
    store: Mutex<RecordStore>,
    registry: RwLock<HashMap<String, EntityEntry>>,
    opts: StoreOptions,
    closed: AtomicBool,
}

impl Schema {
    /// Creates the schema folder and its catalog store.
    pub fn create(root: &Path, name: Name, opts: &StoreOptions) -> Result<Arc<Self>> {
        let path = root.join(format!("schema_{}", name.leaf()));
        std::fs::create_dir_all(&path).map_err(|e| DbError::StorageIo {
            path: path.clone(),
            source: e,
        })?;
        let mut store = RecordStore::open(&path.join(SCHEMA_STORE_FILE), opts)?;
        let recid = store.put(&CatalogHeader::new(), &CatalogHeaderSer)?;
        eyre::ensure!(
            recid == HEADER_RECORD_ID,
            "fresh schema store allocated header at record {}",
            recid
        );
        store.commit()?;
        info!(schema = %name, "schema created");
        Ok(Arc::new(Self {
            name,
            path,
            store: Mutex::new(store),
            registry: RwLock::new(HashMap::new()),
            opts: opts.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    /// Opens an existing schema, loading every entity named by the
    /// header. A missing entity folder is corruption and fails the load.
    pub fn open(root: &Path, name: Name, opts: &StoreOptions) -> Result<Arc<Self>> {
        let path = root.join(format!("schema_{}", name.leaf()));
        let store_path = path.join(SCHEMA_STORE_FILE);
        let store = RecordStore::open(&store_path, opts)?;
        let header = store
            .get(HEADER_RECORD_ID, &CatalogHeaderSer)?
            .ok_or_else(|| DbError::StorageCorruption {
                path: store_path.clone(),
                detail: "missing schema header record".into(),
            })?;

        let mut registry = HashMap::new();
        for recid in &header.entries {
            let descriptor = store
                .get(*recid, &DescriptorSer)?
                .ok_or_else(|| DbError::StorageCorruption {
                    path: store_path.clone(),
                    detail: format!("dangling entity descriptor record {}", recid),
                })?;
            let entity_name = Name::Fqn(vec![name.leaf().to_string(), descriptor.name.clone()]);
            let entity = Entity::open(&path, entity_name, &descriptor.columns, opts)
                .wrap_err_with(|| format!("loading entity '{}'", descriptor.name))?;
            registry.insert(
                descriptor.name,
                EntityEntry {
                    recid: *recid,
                    entity,
                },
            );
        }

        Ok(Arc::new(Self {
            name,
            path,
            store: Mutex::new(store),
            registry: RwLock::new(registry),
            opts: opts.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DbError::TxDboClosed {
                name: self.name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Entity names in no particular order.
    pub fn list_entities(&self) -> Result<Vec<Name>> {
        self.check_open()?;
        let registry = self.registry.read();
        Ok(registry
            .keys()
            .map(|n| Name::Fqn(vec![self.name.leaf().to_string(), n.clone()]))
            .collect())
    }

    pub fn entity(&self, name: &str) -> Result<Arc<Entity>> {
        self.check_open()?;
        let registry = self.registry.read();
        registry
            .get(name)
            .map(|e| Arc::clone(&e.entity))
            .ok_or_else(|| {
                DbError::EntityDoesNotExist {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Creates an entity: folder + column stores, then descriptor and
    /// header in one committed batch. A storage failure removes the
    /// partial folder and rolls the store back.
    pub fn create_entity(&self, name: &Name, defs: &[ColumnDef]) -> Result<Arc<Entity>> {
        self.check_open()?;
        if !name.is_simple() {
            return Err(DbError::SimpleNameRequired {
                name: name.to_string(),
            }
            .into());
        }
        let mut registry = self.registry.write();
        if registry.contains_key(name.leaf()) {
            return Err(DbError::EntityAlreadyExists {
                name: name.to_string(),
            }
            .into());
        }

        let fqn = Name::Fqn(vec![self.name.leaf().to_string(), name.leaf().to_string()]);
        let entity_dir = self.path.join(name.leaf());
        let created = (|| -> Result<(u64, Arc<Entity>)> {
            let entity = Entity::create(&self.path, fqn, defs, &self.opts)?;
            let descriptor = Descriptor::entity(
                name.leaf(),
                defs.iter().map(|d| d.name().to_string()).collect(),
            );
            let mut store = self.store.lock();
            let recid = store.put(&descriptor, &DescriptorSer)?;
            let mut header = Self::read_header(&store)?;
            header.push_entry(recid);
            store.update(HEADER_RECORD_ID, &header, &CatalogHeaderSer)?;
            store.commit()?;
            Ok((recid, entity))
        })();

        match created {
            Ok((recid, entity)) => {
                registry.insert(
                    name.leaf().to_string(),
                    EntityEntry {
                        recid,
                        entity: Arc::clone(&entity),
                    },
                );
                info!(schema = %self.name, entity = %name, "entity created");
                Ok(entity)
            }
            Err(e) => {
                if let Err(rollback_err) = self.store.lock().rollback() {
                    warn!(error = %rollback_err, "schema store rollback failed");
                }
                if entity_dir.exists() {
                    let _ = std::fs::remove_dir_all(&entity_dir);
                }
                Err(e)
            }
        }
    }

    /// Drops an entity: removes its descriptor, rewrites the header,
    /// commits, then closes the entity and deletes its folder. The
    /// entity stays open and registered when the store mutation fails,
    /// so a failed drop leaves it fully usable.
    pub fn drop_entity(&self, name: &Name) -> Result<()> {
        self.check_open()?;
        let mut registry = self.registry.write();
        let entry = registry
            .get(name.leaf())
            .ok_or_else(|| DbError::EntityDoesNotExist {
                name: name.to_string(),
            })?;
        let recid = entry.recid;
        let entity = Arc::clone(&entry.entity);

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
                    warn!(error = %rollback_err, "schema store rollback failed");
                }
                return Err(e);
            }
        }

        entity.close();
        registry.remove(name.leaf());
        let entity_dir = self.path.join(name.leaf());
        if entity_dir.exists() {
            std::fs::remove_dir_all(&entity_dir).map_err(|e| DbError::StorageIo {
                path: entity_dir,
                source: e,
            })?;
        }
        info!(schema = %self.name, entity = %name, "entity dropped");
        Ok(())
    }

    fn read_header(store: &RecordStore) -> Result<CatalogHeader> {
        store
            .get(HEADER_RECORD_ID, &CatalogHeaderSer)?
            .ok_or_else(|| {
                DbError::StorageCorruption {
                    path: store.path().to_path_buf(),
                    detail: "missing schema header record".into(),
                }
                .into()
            })
    }

    /// Closes the schema and every entity under it. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let registry = self.registry.read();
            for entry in registry.values() {
                entry.entity.close();
            }
            info!(schema = %self.name, "schema closed");
        }
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name.to_string())
            .field("entities", &self.registry.read().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use tempfile::tempdir;

    fn defs() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", DataType::Int8, false),
            ColumnDef::vector("vec", DataType::Float4Vector, 2, false),
        ]
    }

    #[test]
    fn create_list_drop_entity() {
        let dir = tempdir().unwrap();
        let schema = Schema::create(
            dir.path(),
            Name::simple("s1").unwrap(),
            &StoreOptions::default(),
        )
        .unwrap();

        schema
            .create_entity(&Name::simple("e1").unwrap(), &defs())
            .unwrap();
        assert_eq!(schema.list_entities().unwrap().len(), 1);
        assert!(schema.entity("e1").is_ok());

        schema.drop_entity(&Name::simple("e1").unwrap()).unwrap();
        assert!(schema.list_entities().unwrap().is_empty());
        let err = schema.entity("e1").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::EntityDoesNotExist { .. })
        ));
        assert!(!dir.path().join("schema_s1").join("e1").exists());
    }

    #[test]
    fn duplicate_entity_rejected() {
        let dir = tempdir().unwrap();
        let schema = Schema::create(
            dir.path(),
            Name::simple("s1").unwrap(),
            &StoreOptions::default(),
        )
        .unwrap();

        schema
            .create_entity(&Name::simple("e1").unwrap(), &defs())
            .unwrap();
        let err = schema
            .create_entity(&Name::simple("e1").unwrap(), &defs())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::EntityAlreadyExists { .. })
        ));
    }

    #[test]
    fn entities_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let schema = Schema::create(
                dir.path(),
                Name::simple("s1").unwrap(),
                &StoreOptions::default(),
            )
            .unwrap();
            schema
                .create_entity(&Name::simple("e1").unwrap(), &defs())
                .unwrap();
            schema.close();
        }
        let schema = Schema::open(
            dir.path(),
            Name::simple("s1").unwrap(),
            &StoreOptions::default(),
        )
        .unwrap();
        let entity = schema.entity("e1").unwrap();
        assert_eq!(entity.column_defs().len(), 2);
    }

    #[test]
    fn fqn_entity_name_rejected() {
        let dir = tempdir().unwrap();
        let schema = Schema::create(
            dir.path(),
            Name::simple("s1").unwrap(),
            &StoreOptions::default(),
        )
        .unwrap();
        let err = schema
            .create_entity(&Name::parse("a.b").unwrap(), &defs())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::SimpleNameRequired { .. })
        ));
    }

    #[test]
    fn missing_entity_folder_is_corruption() {
        let dir = tempdir().unwrap();
        {
            let schema = Schema::create(
                dir.path(),
                Name::simple("s1").unwrap(),
                &StoreOptions::default(),
            )
            .unwrap();
            schema
                .create_entity(&Name::simple("e1").unwrap(), &defs())
                .unwrap();
            schema.close();
        }
        std::fs::remove_dir_all(dir.path().join("schema_s1").join("e1")).unwrap();
        let err = Schema::open(
            dir.path(),
            Name::simple("s1").unwrap(),
            &StoreOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::StorageCorruption { .. })
        ));
    }
}
