use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{DedupKey, TableBackend, TableSchema};
use crate::error::StoreError;
use crate::models::StoredRow;

/// Headered CSV file, rewritten through a sibling temp file on every append
/// so a crash leaves either the old or the new table behind.
pub struct CsvTable {
    path: PathBuf,
}

impl CsvTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn reader(&self) -> Result<csv::Reader<File>, StoreError> {
        Ok(csv::Reader::from_path(&self.path)?)
    }
}

impl TableBackend for CsvTable {
    fn location(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn table_exists(&self) -> Result<bool, StoreError> {
        Ok(self.path.try_exists()?)
    }

    fn create_table(&mut self, schema: &TableSchema) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(self.dir())?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record(schema.columns)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&self.path)?;
        Ok(())
    }

    fn validate_schema(&self, schema: &TableSchema) -> Result<(), StoreError> {
        let mut reader = self.reader()?;
        let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        schema.check_columns(&found)
    }

    fn read_all_keys(&self) -> Result<HashSet<DedupKey>, StoreError> {
        let mut keys = HashSet::new();
        for row in self.reader()?.deserialize::<StoredRow>() {
            let row = row?;
            keys.insert((row.email, row.password));
        }
        Ok(keys)
    }

    fn append_rows(&mut self, rows: &[StoredRow]) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(self.dir())?;
        std::io::copy(&mut File::open(&self.path)?, tmp.as_file_mut())?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }

    fn read_all_rows(&self) -> Result<Vec<StoredRow>, StoreError> {
        let rows = self
            .reader()?
            .deserialize::<StoredRow>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
