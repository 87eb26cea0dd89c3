//! Bulk loading of JSON documents.
//!
//! A [`DocumentSource`] yields plain JSON objects; [`bulk_load`] turns each
//! into a put against a [`Table`] and stops at the first record that fails.

use std::fmt;
use std::io;
use std::path::Path;

use docstore_model::Item;
use tracing::{debug, info};

use crate::client::Table;
use crate::error::AccessError;
use crate::request::PutSpec;

/// Yields JSON records in order.
pub trait DocumentSource: fmt::Debug + Send {
    /// The next record, or `None` when exhausted.
    fn next_record(&mut self) -> Option<serde_json::Value>;
}

/// Records read from a JSON array.
#[derive(Debug)]
pub struct JsonArraySource {
    records: std::vec::IntoIter<serde_json::Value>,
}

impl JsonArraySource {
    /// Parse a JSON array held in memory.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<serde_json::Value> = serde_json::from_str(text)?;
        Ok(Self::from_records(records))
    }

    /// Read and parse a JSON array file.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_json_str(&text)?)
    }

    /// Wrap already parsed records.
    #[must_use]
    pub fn from_records(records: Vec<serde_json::Value>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }

    /// Records not yet yielded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl DocumentSource for JsonArraySource {
    fn next_record(&mut self) -> Option<serde_json::Value> {
        self.records.next()
    }
}

/// Put every record of `source` into `table`, in order.
///
/// Returns the number of records written. The first record that is not an
/// object or cannot be written fails the load with [`AccessError::Load`];
/// records before it stay written.
pub async fn bulk_load(table: &Table, source: &mut dyn DocumentSource) -> Result<usize, AccessError> {
    let mut loaded = 0;
    while let Some(record) = source.next_record() {
        let item = Item::from_json(&record).map_err(|e| AccessError::Load {
            record: loaded,
            source: Box::new(e),
        })?;
        table
            .put_item(PutSpec::new(item))
            .await
            .map_err(|e| AccessError::Load {
                record: loaded,
                source: Box::new(e),
            })?;
        debug!(collection = %table.name(), record = loaded, "loaded record");
        loaded += 1;
    }
    info!(collection = %table.name(), loaded, "bulk load finished");
    Ok(loaded)
}
