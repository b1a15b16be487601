//! Run configuration for region-annotator.
//!
//! All command-line and default options resolve into one immutable
//! [`RunConfig`] before the core is invoked; no component reads ambient
//! configuration.

use std::path::{Path, PathBuf};

use crate::format::Format;

/// What kind of data an ingestion run loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestKind {
    /// User regions to annotate (the default).
    #[default]
    UserInput,
    /// One or more reference datasets, named after their source files.
    Reference,
    /// The gene catalog.
    Gene,
}

/// The resolved options of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Input file or folder; `None` runs export-only commands.
    pub input: Option<PathBuf>,
    /// Output file or folder.
    pub output: PathBuf,
    /// Documentation template workbook for spreadsheet output.
    pub template: PathBuf,
    /// Folder holding the embedded database.
    pub db_location: PathBuf,
    /// Forced input format; inferred from extensions when `None`.
    pub input_format: Option<Format>,
    pub output_format: Format,
    pub ingest: IngestKind,
    /// Whether the first input row carries column names.
    pub first_row_names: bool,
    /// Replace existing tables with the same names.
    pub overwrite: bool,
    /// Run the annotation pipeline after ingestion.
    pub operate: bool,
    pub cache_size_kb: i64,
    pub timeout_ms: u64,
    /// Export one named dataset.
    pub get: Option<String>,
    /// Export every persisted dataset.
    pub get_all: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            input: None,
            output: PathBuf::from("output"),
            template: PathBuf::from("documentation.xlsx"),
            db_location: PathBuf::from("."),
            input_format: None,
            output_format: Format::Excel,
            ingest: IngestKind::UserInput,
            first_row_names: true,
            overwrite: true,
            operate: true,
            cache_size_kb: 2_000_000,
            timeout_ms: 30_000,
            get: None,
            get_all: false,
        }
    }
}

impl RunConfig {
    /// Whether this run annotates user input (as opposed to seeding
    /// reference data).
    pub fn is_annotation_run(&self) -> bool {
        matches!(self.ingest, IngestKind::UserInput)
    }
}

/// Dataset name for an ingested reference file: the lower-cased file stem
/// with inner dots flattened, under a leading underscore.
///
/// `gwas_catalog.xlsx` seeds the table `_gwas_catalog`.
pub fn reference_dataset_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    let stem = match name.rfind('.') {
        Some(i) => &name[..i],
        None => name,
    };
    format!("_{}", stem.to_lowercase().replace('.', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.output_format, Format::Excel);
        assert!(config.first_row_names);
        assert!(config.overwrite);
        assert!(config.operate);
        assert_eq!(config.cache_size_kb, 2_000_000);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.template, PathBuf::from("documentation.xlsx"));
        assert!(config.is_annotation_run());
    }

    #[test]
    fn test_reference_dataset_name() {
        assert_eq!(
            reference_dataset_name(Path::new("gwas_catalog.xlsx")),
            "_gwas_catalog"
        );
        assert_eq!(
            reference_dataset_name(Path::new("/data/OMIM.csv")),
            "_omim"
        );
        assert_eq!(
            reference_dataset_name(Path::new("mouse.knockout.tsv.gz")),
            "_mouse_knockout"
        );
        assert_eq!(reference_dataset_name(Path::new("plain")), "_plain");
    }
}
