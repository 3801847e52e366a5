//! Session persistence
//!
//! Every record category maps to one CSV file in the session folder, created
//! with its header line when the session is prepared. Buffered records are
//! appended in bulk at drain time.

use crate::recorder::channel::{RecordingError, RecordingResult};
use parking_lot::Mutex as ParkingMutex;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A record that can be written as one CSV row
pub trait CsvRecord {
    fn csv_fields(&self) -> Vec<String>;
}

/// Record category, one CSV file each
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Keypress,
    MouseMove,
    MouseClick,
    ScreenFrames,
    /// Host-defined category written through `save_data`
    Extra(String),
}

impl Category {
    pub const BUILT_IN: [Category; 4] = [
        Category::Keypress,
        Category::MouseMove,
        Category::MouseClick,
        Category::ScreenFrames,
    ];

    pub fn name(&self) -> &str {
        match self {
            Category::Keypress => "keypressData",
            Category::MouseMove => "mouseMoveData",
            Category::MouseClick => "mouseClickData",
            Category::ScreenFrames => "screenCaptureMetaData",
            Category::Extra(name) => name,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name())
    }

    /// Header columns of the built-in categories. Extra categories bring
    /// their own.
    pub fn default_header(&self) -> Vec<String> {
        let columns: &[&str] = match self {
            Category::Keypress => &[
                "timestamp_keydown_(sess_start_ms)",
                "timestamp_keyup_(sess_start_ms)",
                "duration_(ms)",
                "suspect",
            ],
            Category::MouseMove => &[
                "timestamp_mousemove_(sess_start_ms)",
                "abs_x",
                "abs_y",
                "duration_since_last_move_(ms)",
                "suspect",
            ],
            Category::MouseClick => &[
                "timestamp_mouseclickdown_(sess_start_ms)",
                "timestamp_mouseclickup_(sess_start_ms)",
                "duration_(ms)",
                "suspect",
            ],
            Category::ScreenFrames => &["timestamp_(sess_start_ms)", "frame_timestamp", "suspect"],
            Category::Extra(_) => &[],
        };
        columns.iter().map(|c| c.to_string()).collect()
    }

    /// Resolve a category by its file stem
    pub fn from_name(name: &str) -> Self {
        Self::BUILT_IN
            .into_iter()
            .find(|c| c.name() == name)
            .unwrap_or_else(|| Category::Extra(name.to_string()))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A category and the header line its file starts with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpec {
    pub category: Category,
    pub header: Vec<String>,
}

impl CategorySpec {
    pub fn built_in(category: Category) -> Self {
        let header = category.default_header();
        Self { category, header }
    }

    /// Extra category with a comma-separated header line
    pub fn extra(name: &str, header_line: &str) -> Self {
        Self {
            category: Category::Extra(name.to_string()),
            header: header_line.split(',').map(|c| c.trim().to_string()).collect(),
        }
    }
}

/// Destination for drained records
pub trait PersistenceWriter: Send + Sync {
    /// Create `<root>/<session_name>/` with one file per category, each
    /// starting with its header. Returns the session folder.
    fn prepare(
        &self,
        categories: &[CategorySpec],
        session_name: &str,
        root: &Path,
    ) -> RecordingResult<PathBuf>;

    /// Append rows to a prepared category and flush.
    fn write(&self, category: &Category, rows: &[Vec<String>]) -> RecordingResult<()>;
}

/// CSV files in a session folder
#[derive(Default)]
pub struct CsvSessionWriter {
    files: ParkingMutex<HashMap<Category, csv::Writer<File>>>,
}

impl CsvSessionWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceWriter for CsvSessionWriter {
    fn prepare(
        &self,
        categories: &[CategorySpec],
        session_name: &str,
        root: &Path,
    ) -> RecordingResult<PathBuf> {
        let folder = root.join(session_name);
        std::fs::create_dir_all(&folder)?;

        let mut files = self.files.lock();
        files.clear();

        for spec in categories {
            let path = folder.join(spec.category.file_name());
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&path)?;
            writer.write_record(&spec.header)?;
            writer.flush()?;
            files.insert(spec.category.clone(), writer);
        }

        tracing::info!(
            "Prepared session folder {} ({} categories)",
            folder.display(),
            categories.len()
        );
        Ok(folder)
    }

    fn write(&self, category: &Category, rows: &[Vec<String>]) -> RecordingResult<()> {
        let mut files = self.files.lock();
        let writer = files
            .get_mut(category)
            .ok_or_else(|| RecordingError::UnknownCategory(category.to_string()))?;

        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        tracing::debug!("Wrote {} rows to {}", rows.len(), category.file_name());
        Ok(())
    }
}

/// Render records as CSV rows
pub fn to_rows<T: CsvRecord>(records: &[T]) -> Vec<Vec<String>> {
    records.iter().map(CsvRecord::csv_fields).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_prepare_writes_headers() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CsvSessionWriter::new();
        let specs: Vec<_> = Category::BUILT_IN
            .into_iter()
            .map(CategorySpec::built_in)
            .collect();

        let folder = writer.prepare(&specs, "session-1", dir.path()).unwrap();
        assert_eq!(folder, dir.path().join("session-1"));

        let keypress = read(&folder.join("keypressData.csv"));
        assert_eq!(
            keypress,
            "timestamp_keydown_(sess_start_ms),timestamp_keyup_(sess_start_ms),duration_(ms),suspect\n"
        );
        assert!(folder.join("mouseMoveData.csv").exists());
        assert!(folder.join("mouseClickData.csv").exists());
        assert!(folder.join("screenCaptureMetaData.csv").exists());
    }

    #[test]
    fn test_write_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CsvSessionWriter::new();
        let folder = writer
            .prepare(&[CategorySpec::extra("surveyData", "question,answer")], "s", dir.path())
            .unwrap();

        let category = Category::from_name("surveyData");
        writer
            .write(&category, &[vec!["q1".into(), "yes".into()]])
            .unwrap();
        writer
            .write(&category, &[vec!["q2".into(), "no, thanks".into()]])
            .unwrap();

        assert_eq!(
            read(&folder.join("surveyData.csv")),
            "question,answer\nq1,yes\nq2,\"no, thanks\"\n"
        );
    }

    #[test]
    fn test_unprepared_category_is_rejected() {
        let writer = CsvSessionWriter::new();
        let result = writer.write(&Category::Keypress, &[]);
        assert!(matches!(result, Err(RecordingError::UnknownCategory(name)) if name == "keypressData"));
    }

    #[test]
    fn test_from_name_resolves_built_ins() {
        assert_eq!(Category::from_name("mouseMoveData"), Category::MouseMove);
        assert_eq!(
            Category::from_name("gazeData"),
            Category::Extra("gazeData".to_string())
        );
    }
}
