//! # DDL Service
//!
//! Data-definition surface over the catalogue: schema and entity
//! lifecycle, entity introspection, and index definition. Index kinds
//! without an implementation are rejected here, at the definition
//! boundary, instead of being accepted and left unusable.

use std::sync::Arc;

use eyre::Result;
use uuid::Uuid;

use crate::catalog::{Catalogue, IndexType};
use crate::types::{ColumnDef, Name};

/// Introspection result for one entity.
#[derive(Debug, Clone)]
pub struct EntityDetails {
    pub name: Name,
    pub columns: Vec<ColumnDef>,
    pub rows: i64,
    pub indexes: Vec<String>,
}

/// Data-definition operations.
pub struct DdlService {
    catalogue: Arc<Catalogue>,
}

impl DdlService {
    pub fn new(catalogue: Arc<Catalogue>) -> Self {
        Self { catalogue }
    }

    pub fn list_schemas(&self) -> Result<Vec<Name>> {
        self.catalogue.list_schemas()
    }

    pub fn create_schema(&self, name: &str) -> Result<Name> {
        let name = Name::simple(name)?;
        self.catalogue.create_schema(&name)?;
        Ok(name)
    }

    pub fn drop_schema(&self, name: &str) -> Result<()> {
        self.catalogue.drop_schema(&Name::simple(name)?)
    }

    pub fn list_entities(&self, schema: &str) -> Result<Vec<Name>> {
        self.catalogue.schema(schema)?.list_entities()
    }

    pub fn create_entity(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> Result<Name> {
        let entity_name = Name::simple(name)?;
        self.catalogue
            .schema(schema)?
            .create_entity(&entity_name, columns)?;
        Ok(Name::Fqn(vec![schema.to_string(), name.to_string()]))
    }

    pub fn drop_entity(&self, schema: &str, name: &str) -> Result<()> {
        self.catalogue
            .schema(schema)?
            .drop_entity(&Name::simple(name)?)
    }

    pub fn entity_details(&self, schema: &str, name: &str) -> Result<EntityDetails> {
        let entity = self.catalogue.schema(schema)?.entity(name)?;
        let rows = {
            let tx = entity.new_transaction(true, Uuid::new_v4())?;
            tx.count()?
        };
        Ok(EntityDetails {
            name: entity.name().clone(),
            columns: entity.column_defs(),
            rows,
            indexes: entity.list_indexes(),
        })
    }

    /// Defines an index over entity columns. Every named column must
    /// exist; unimplemented index kinds fail with `IndexUnsupported`.
    pub fn create_index(
        &self,
        schema: &str,
        entity: &str,
        name: &str,
        index_type: IndexType,
        columns: &[String],
    ) -> Result<()> {
        let target = self.catalogue.schema(schema)?.entity(entity)?;
        for column in columns {
            target.column(column)?;
        }
        let index_name = Name::Fqn(vec![
            schema.to_string(),
            entity.to_string(),
            name.to_string(),
        ]);
        let index = index_type.create(index_name, columns.to_vec())?;
        target.add_index(index)
    }

    pub fn drop_index(&self, schema: &str, entity: &str, name: &str) -> Result<()> {
        self.catalogue.schema(schema)?.entity(entity)?.drop_index(name)
    }
}
