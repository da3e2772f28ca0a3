use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

/// Rows of one tabular data file with a wrapping read cursor.
#[derive(Debug, Default)]
pub struct FileTable {
    columns: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
    cursor: AtomicUsize,
}

impl FileTable {
    #[must_use]
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let columns = header
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name, idx))
            .collect();
        Self {
            columns,
            rows,
            cursor: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns `column` of the next row, wrapping to the first row after the
    /// last one. Every call advances the cursor, even when the column is
    /// missing.
    #[must_use]
    pub fn next_value(&self, column: &str) -> Option<String> {
        let len = self.rows.len();
        if len == 0 {
            return None;
        }
        let row = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |idx| {
                Some(idx.saturating_add(1).rem_euclid(len))
            })
            .unwrap_or_else(|idx| idx)
            .rem_euclid(len);
        let col = *self.columns.get(column)?;
        self.rows.get(row)?.get(col).cloned()
    }

    fn parse(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => match serde_json::from_str::<Vec<Map<String, Value>>>(content) {
                Ok(objects) => Self::from_objects(objects),
                Err(err) => {
                    warn!("Data file {} is not a JSON array of objects: {}", path.display(), err);
                    Self::default()
                }
            },
            Some("jsonl") => {
                let mut objects = Vec::new();
                for line in content.lines().filter(|line| !line.trim().is_empty()) {
                    match serde_json::from_str::<Map<String, Value>>(line) {
                        Ok(object) => objects.push(object),
                        Err(err) => {
                            warn!("Skipping malformed line in {}: {}", path.display(), err);
                        }
                    }
                }
                Self::from_objects(objects)
            }
            _ => Self::from_delimited(content),
        }
    }

    fn from_objects(objects: Vec<Map<String, Value>>) -> Self {
        let mut header: Vec<String> = Vec::new();
        for object in &objects {
            for key in object.keys() {
                if !header.contains(key) {
                    header.push(key.clone());
                }
            }
        }
        let rows = objects
            .iter()
            .map(|object| {
                header
                    .iter()
                    .map(|key| match object.get(key) {
                        Some(Value::String(value)) => value.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    })
                    .collect()
            })
            .collect();
        Self::new(header, rows)
    }

    fn from_delimited(content: &str) -> Self {
        let mut lines = content.lines().filter(|line| !line.trim().is_empty());
        let Some(header_line) = lines.next() else {
            return Self::default();
        };
        if content.contains('"') {
            warn!("Quoted cells are not supported in delimited data files, splitting on every comma");
        }
        let header = split_row(header_line);
        let rows = lines.map(split_row).collect();
        Self::new(header, rows)
    }
}

fn split_row(line: &str) -> Vec<String> {
    line.split(',').map(|cell| cell.trim().to_owned()).collect()
}

/// Lazily loaded file sources, cached per file name for the lifetime of the
/// options that reference them.
///
/// Files other than `.json` and `.jsonl` are read as plain comma-separated
/// text with a header row. There is no quoting: a quoted cell that contains a
/// comma is split like any other.
#[derive(Debug)]
pub struct FileSources {
    base_dir: PathBuf,
    tables: Mutex<HashMap<String, Arc<FileTable>>>,
}

impl FileSources {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the table for `name`, loading it on first use. A file that
    /// cannot be read is cached as an empty table.
    /// The file is read without holding the cache lock; when two callers race
    /// on the first load, the table cached first is the one both get.
    pub fn table(&self, name: &str) -> Arc<FileTable> {
        if let Some(table) = self
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(table);
        }
        let loaded = Arc::new(self.load(name));
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tables.entry(name.to_owned()).or_insert(loaded))
    }

    /// Round-robin read of `column` from the source named `name`.
    #[must_use]
    pub fn next_value(&self, name: &str, column: &str) -> Option<String> {
        self.table(name).next_value(column)
    }

    /// Registers an in-memory table under `name`, replacing any cached one.
    pub fn insert(&self, name: &str, table: FileTable) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.insert(name.to_owned(), Arc::new(table));
    }

    fn load(&self, name: &str) -> FileTable {
        let path = self.base_dir.join(name);
        match read_source(&path) {
            Ok(content) => {
                let table = FileTable::parse(&path, &content);
                debug!("Loaded {} rows from {}", table.len(), path.display());
                table
            }
            Err(err) => {
                warn!("Failed to read data file {}: {}", path.display(), err);
                FileTable::default()
            }
        }
    }
}

/// Reads a data file, stepping off the async worker first when called from a
/// multi-thread runtime.
fn read_source(path: &Path) -> std::io::Result<String> {
    let on_worker = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if on_worker {
        tokio::task::block_in_place(|| std::fs::read_to_string(path))
    } else {
        std::fs::read_to_string(path)
    }
}
