//! Export orchestration.
//!
//! Three export shapes: the default annotation bundle (one composite
//! workbook, fixed sheet order), a single named dataset, or every persisted
//! dataset. Styling templates from the catalog supply per-column display
//! flags; the stored column order is what gets written.

use std::path::PathBuf;

use tracing::info;

use crate::config::RunConfig;
use crate::error::Result;
use crate::format::{self, ExcelWriter, Format};
use crate::schema::{
    Catalog, Schema, ASD_GENES, GWAS_CATALOG, ID_DEVDELAY_GENES, MOUSE_KNOCKOUT, OMIM,
    PROTEIN_CODING_GENES, PROTEIN_CODING_GENES_ALL, PSYCHIATRIC_CNVS, USER_INPUT,
};
use crate::store::DataStore;

/// Datasets of the default annotation bundle, in their fixed sheet order.
const BUNDLE_DATASETS: [&str; 8] = [
    USER_INPUT,
    PROTEIN_CODING_GENES,
    GWAS_CATALOG,
    OMIM,
    PSYCHIATRIC_CNVS,
    ASD_GENES,
    ID_DEVDELAY_GENES,
    MOUSE_KNOCKOUT,
];

/// Styling template for a dataset, where one applies.
fn style_for<'a>(catalog: &'a Catalog, dataset: &str) -> Option<&'a Schema> {
    match dataset {
        USER_INPUT => catalog.lookup(USER_INPUT).ok(),
        PROTEIN_CODING_GENES | PROTEIN_CODING_GENES_ALL | GWAS_CATALOG | PSYCHIATRIC_CNVS
        | MOUSE_KNOCKOUT => Some(catalog.link_template()),
        OMIM | ASD_GENES | ID_DEVDELAY_GENES => Some(catalog.reduced_link_template()),
        // Reference tables and ad-hoc datasets style themselves from the
        // catalog when declared there.
        _ => catalog.lookup(dataset).ok(),
    }
}

/// Output path for one exported dataset: `<name>_out.<ext>` inside the
/// output folder, or the output path itself when it names a file.
fn dataset_path(config: &RunConfig, dataset: &str) -> PathBuf {
    if config.output.is_dir() {
        config.output.join(format!(
            "{}_out.{}",
            dataset,
            config.output_format.extension()
        ))
    } else {
        config.output.clone()
    }
}

/// Output path for the composite bundle workbook: named after the input
/// file inside the output folder, or the output path itself when it names
/// a file.
fn bundle_path(config: &RunConfig) -> PathBuf {
    if config.output.is_dir() {
        let stem = config
            .input
            .as_ref()
            .filter(|p| p.is_file())
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        config.output.join(format!("{}_out.xlsx", stem))
    } else {
        config.output.clone()
    }
}

/// Export one named dataset.
pub fn export_one(
    store: &DataStore,
    catalog: &Catalog,
    config: &RunConfig,
    dataset: &str,
) -> Result<()> {
    let record = store.fetch(dataset, style_for(catalog, dataset))?;
    let path = dataset_path(config, dataset);
    format::write_file(&record, &path, config.output_format, true)?;
    info!(dataset, path = %path.display(), rows = record.len(), "exported");
    Ok(())
}

/// Export every persisted dataset.
pub fn export_all(store: &DataStore, catalog: &Catalog, config: &RunConfig) -> Result<()> {
    for dataset in store.list_datasets()? {
        export_one(store, catalog, config, &dataset)?;
    }
    Ok(())
}

/// Export the default annotation bundle.
///
/// With spreadsheet output this is one composite workbook: the copied
/// documentation page first (when the template provides one), then every
/// annotated dataset as its own sheet, in fixed order. Text formats write
/// one file per dataset instead.
pub fn export_bundle(store: &DataStore, catalog: &Catalog, config: &RunConfig) -> Result<()> {
    if config.output_format != Format::Excel {
        for dataset in BUNDLE_DATASETS {
            export_one(store, catalog, config, dataset)?;
        }
        return Ok(());
    }

    let path = bundle_path(config);
    let mut writer = ExcelWriter::new();
    if writer.copy_readme(&config.template)? {
        info!(template = %config.template.display(), "documentation page copied");
    }
    for dataset in BUNDLE_DATASETS {
        let record = store.fetch(dataset, style_for(catalog, dataset))?;
        writer.add_sheet(&dataset.to_lowercase(), &record, true)?;
    }
    writer.save(&path)?;
    info!(path = %path.display(), "bundle written");
    Ok(())
}
