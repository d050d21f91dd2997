// In-memory copies of stored records, kept by the owner of a schema.
use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::{KeyfolderError, Result};

pub type Record = Map<String, Value>;

pub trait RecordCache: Send + Sync {
    /// Visits every live record of a dataset, allowing it to be changed in place.
    fn for_each_record(&self, dataset: &str, visit: &mut dyn FnMut(&mut Record)) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    datasets: Mutex<HashMap<String, Vec<Record>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&self, dataset: &str, record: Value) -> Result<()> {
        let record = match record {
            Value::Object(record) => record,
            other => {
                return Err(KeyfolderError::Persistence(format!(
                    "a record must be an object, got {}",
                    other
                )))
            }
        };
        self.datasets
            .lock()
            .map_err(|e| KeyfolderError::Lock(e.to_string()))?
            .entry(dataset.to_string())
            .or_default()
            .push(record);
        Ok(())
    }
    /// A snapshot of the records currently cached for a dataset.
    pub fn records(&self, dataset: &str) -> Result<Vec<Record>> {
        Ok(self
            .datasets
            .lock()
            .map_err(|e| KeyfolderError::Lock(e.to_string()))?
            .get(dataset)
            .cloned()
            .unwrap_or_default())
    }
    pub fn count(&self, dataset: &str) -> usize {
        self.datasets
            .lock()
            .map(|datasets| datasets.get(dataset).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl RecordCache for MemoryCache {
    fn for_each_record(&self, dataset: &str, visit: &mut dyn FnMut(&mut Record)) -> Result<()> {
        let mut datasets = self
            .datasets
            .lock()
            .map_err(|e| KeyfolderError::Lock(e.to_string()))?;
        if let Some(records) = datasets.get_mut(dataset) {
            for record in records.iter_mut() {
                visit(record);
            }
        }
        Ok(())
    }
}
