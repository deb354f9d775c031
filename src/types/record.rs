//! # Records and Recordsets
//!
//! A [`Record`] is a free-standing row: tuple-id plus parallel arrays of
//! column definitions and values. A [`Recordset`] amortizes the schema
//! across many rows: one ordered `ColumnDef` array shared by every
//! [`Row`]. That is the shape every execution task consumes and emits.
//!
//! Row order is part of the contract: a recordset preserves the order in
//! which its producing task emitted rows.

use std::sync::Arc;

use eyre::{ensure, Result};

use crate::types::{ColumnDef, TupleId, Value};

/// A free-standing row carrying its own column definitions.
///
/// Equality is element-wise over all three components. Bulk pipelines use
/// [`Recordset`] instead; free-standing records are for single-row paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub tuple_id: TupleId,
    pub columns: Vec<ColumnDef>,
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(tuple_id: TupleId, columns: Vec<ColumnDef>, values: Vec<Value>) -> Result<Self> {
        ensure!(
            columns.len() == values.len(),
            "record arity mismatch: {} columns, {} values",
            columns.len(),
            values.len()
        );
        Ok(Self {
            tuple_id,
            columns,
            values,
        })
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.name() == column)
            .map(|i| &self.values[i])
    }
}

/// One row of a recordset; the schema lives on the containing set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub tuple_id: TupleId,
    pub values: Vec<Value>,
}

/// In-memory tabular result: an ordered column schema plus rows.
#[derive(Debug, Clone, Default)]
pub struct Recordset {
    columns: Arc<Vec<ColumnDef>>,
    rows: Vec<Row>,
}

impl Recordset {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns: Arc::new(columns),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<ColumnDef>, rows: Vec<Row>) -> Self {
        Self {
            columns: Arc::new(columns),
            rows,
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Shared schema handle for derived recordsets with identical columns.
    pub fn columns_arc(&self) -> Arc<Vec<ColumnDef>> {
        Arc::clone(&self.columns)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn push(&mut self, tuple_id: TupleId, values: Vec<Value>) -> Result<()> {
        ensure!(
            values.len() == self.columns.len(),
            "row arity mismatch: {} values for {} columns",
            values.len(),
            self.columns.len()
        );
        self.rows.push(Row { tuple_id, values });
        Ok(())
    }

    pub fn push_row(&mut self, row: Row) -> Result<()> {
        ensure!(
            row.values.len() == self.columns.len(),
            "row arity mismatch: {} values for {} columns",
            row.values.len(),
            self.columns.len()
        );
        self.rows.push(row);
        Ok(())
    }

    pub fn row(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Materializes one row as a free-standing record.
    pub fn record(&self, idx: usize) -> Option<Record> {
        self.rows.get(idx).map(|row| Record {
            tuple_id: row.tuple_id,
            columns: self.columns.as_ref().clone(),
            values: row.values.clone(),
        })
    }

    /// Rough per-row wire size, used to bound DQL response chunks.
    pub fn estimated_row_bytes(&self) -> usize {
        let fixed: usize = self
            .columns
            .iter()
            .map(|c| {
                c.data_type()
                    .element_size()
                    .map(|e| e * c.size())
                    .unwrap_or(32)
            })
            .sum();
        // tuple-id plus per-cell framing overhead
        fixed + 8 + 4 * self.columns.len()
    }
}

impl<'a> IntoIterator for &'a Recordset {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
