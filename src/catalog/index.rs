//! # Index Contract
//!
//! Secondary index seam. The engine ships exactly one implementation,
//! the uniform scan that backs the kNN operator, but the contract is
//! pluggable so hash, tree, and quantization indexes can land behind the
//! same DDL surface. `CreateIndex` for an unimplemented kind is rejected
//! at the DDL layer rather than accepted and left unusable.

use std::sync::Arc;

use eyre::Result;

use crate::catalog::entity::EntityTx;
use crate::error::DbError;
use crate::exec::Predicate;
use crate::types::{Name, Recordset};

/// Index kinds the DDL surface recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// Full-column scan; always available, no auxiliary structure.
    UniformScan,
    Hash,
    BTree,
    Lucene,
    VaFile,
    Pq,
    Lsh,
}

impl IndexType {
    pub fn type_name(&self) -> &'static str {
        match self {
            IndexType::UniformScan => "uniform_scan",
            IndexType::Hash => "hash",
            IndexType::BTree => "btree",
            IndexType::Lucene => "lucene",
            IndexType::VaFile => "va_file",
            IndexType::Pq => "pq",
            IndexType::Lsh => "lsh",
        }
    }

    /// Constructs an index of this kind over the given columns, or
    /// rejects the kind when no implementation exists.
    pub fn create(&self, name: Name, columns: Vec<String>) -> Result<Arc<dyn Index>> {
        match self {
            IndexType::UniformScan => Ok(Arc::new(UniformScanIndex { name, columns })),
            other => Err(DbError::IndexUnsupported {
                kind: other.type_name(),
            }
            .into()),
        }
    }
}

/// The pluggable index contract: filter an entity's rows down to a
/// recordset, optionally under a predicate.
pub trait Index: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &Name;

    fn index_type(&self) -> IndexType;

    /// Columns covered by this index.
    fn columns(&self) -> &[String];

    /// Produces the matching rows through an open entity transaction.
    fn scan(&self, tx: &EntityTx, predicate: Option<&Predicate>) -> Result<Recordset>;
}

/// The always-available index: a full scan with optional predicate.
#[derive(Debug)]
pub struct UniformScanIndex {
    name: Name,
    columns: Vec<String>,
}

impl Index for UniformScanIndex {
    fn name(&self) -> &Name {
        &self.name
    }

    fn index_type(&self) -> IndexType {
        IndexType::UniformScan
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn scan(&self, tx: &EntityTx, predicate: Option<&Predicate>) -> Result<Recordset> {
        let all = tx.scan()?;
        match predicate {
            None => Ok(all),
            Some(p) => {
                let mut out = Recordset::new(all.columns().to_vec());
                for row in all.iter() {
                    if p.evaluate(all.columns(), row)? {
                        out.push_row(row.clone())?;
                    }
                }
                Ok(out)
            }
        }
    }
}
