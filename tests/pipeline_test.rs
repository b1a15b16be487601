//! End-to-end pipeline scenarios through the library API.
//!
//! Seeds a temp-dir store with a small gene catalog and reference datasets,
//! runs the annotation stages, and checks the candidate sets and annotated
//! outputs row by row.

use tempfile::TempDir;

use region_annotator::record::Value;
use region_annotator::schema::{
    Catalog, ASD_GENES_REF, GENE_MASTER, GWAS_CATALOG, GWAS_CATALOG_REF, ID_DEVDELAY_GENES_REF,
    MOUSE_KNOCKOUT_REF, OMIM, OMIM_REF, PROTEIN_CODING_GENES, PROTEIN_CODING_GENES_ALL,
    PSYCHIATRIC_CNVS_REF, USER_INPUT, USER_INPUT_RAW,
};
use region_annotator::store::{DataStore, TableSource};
use region_annotator::{pipeline, TabularRecord};

// Column positions in PROTEIN_CODING_GENES_ALL rows.
const COL_GENENAME_GM: usize = 9;
const COL_DIST: usize = 15;

struct Fixture {
    _dir: TempDir,
    catalog: Catalog,
    store: DataStore,
}

/// A store seeded with one gene catalog and the six reference datasets.
///
/// Genes: GENE1 overlaps the input region, GENE2 sits 48 kb away (metric
/// distance 59 kb), GENE3 is outside the 10 Mb window, GENE4 is not
/// protein-coding.
fn seeded_fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::builtin().unwrap();
    let mut store = DataStore::new(dir.path(), 2000, 1000);
    store.connect().unwrap();

    let mut genes = catalog.new_record(GENE_MASTER).unwrap();
    for (chr, bp1, bp2, name, entrez, ensembl, ttype, strand) in [
        ("1", 1500, 2500, "GENE1", 111, "ENSG000001", "protein_coding", "+"),
        ("1", 50_000, 60_000, "GENE2", 222, "ENSG000002", "protein_coding", "-"),
        ("1", 20_000_000, 20_010_000, "GENE3", 333, "ENSG000003", "protein_coding", "+"),
        ("1", 1500, 2500, "GENE4", 444, "ENSG000004", "lincRNA", "+"),
    ] {
        genes
            .append_row(vec![
                ("CHR", Value::text(chr)),
                ("BP1", Value::Int(bp1)),
                ("BP2", Value::Int(bp2)),
                ("GENENAME", Value::text(name)),
                ("ENTREZ", Value::Int(entrez)),
                ("ENSEMBL", Value::text(ensembl)),
                ("TTYPE", Value::text(ttype)),
                ("STRAND", Value::text(strand)),
            ])
            .unwrap();
    }
    store
        .create_table(GENE_MASTER, TableSource::Rows(&genes), true)
        .unwrap();

    let mut gwas = catalog.new_record(GWAS_CATALOG_REF).unwrap();
    gwas.append_row(vec![
        ("CHR", Value::text("1")),
        ("BP1", Value::Int(1200)),
        ("BP2", Value::Int(1200)),
        ("SNPID", Value::text("rs99")),
        ("PVALUE", Value::Float(1e-8)),
        ("PMID", Value::Int(12345)),
        ("TRAIT", Value::text("height")),
    ])
    .unwrap();
    store
        .create_table(GWAS_CATALOG_REF, TableSource::Rows(&gwas), true)
        .unwrap();

    let mut omim = catalog.new_record(OMIM_REF).unwrap();
    omim.append_row(vec![
        ("GENENAME", Value::text("GENE1")),
        ("OMIMGENE", Value::text("OMIM:1")),
        ("OMIMDISEASE", Value::text("some disease")),
        ("TYPE", Value::text("dominant")),
    ])
    .unwrap();
    store
        .create_table(OMIM_REF, TableSource::Rows(&omim), true)
        .unwrap();

    for name in [
        PSYCHIATRIC_CNVS_REF,
        ASD_GENES_REF,
        ID_DEVDELAY_GENES_REF,
        MOUSE_KNOCKOUT_REF,
    ] {
        let empty = catalog.new_record(name).unwrap();
        store
            .create_table(name, TableSource::Rows(&empty), true)
            .unwrap();
    }
    store.commit().unwrap();

    Fixture {
        _dir: dir,
        catalog,
        store,
    }
}

fn seed_user_input(fixture: &Fixture, rows: &[(i64, &str, i64, i64, &str, f64)]) {
    let mut record = fixture.catalog.new_record(USER_INPUT_RAW).unwrap();
    for (inputid, chr, bp1, bp2, snpid, pvalue) in rows {
        record
            .append_row(vec![
                ("INPUTID", Value::Int(*inputid)),
                ("CHR", Value::text(*chr)),
                ("BP1", Value::Int(*bp1)),
                ("BP2", Value::Int(*bp2)),
                ("SNPID", Value::text(*snpid)),
                ("PVALUE", Value::Float(*pvalue)),
            ])
            .unwrap();
    }
    fixture
        .store
        .create_table(USER_INPUT_RAW, TableSource::Rows(&record), true)
        .unwrap();
    fixture.store.commit().unwrap();
}

fn gene_names(record: &TabularRecord) -> Vec<String> {
    record
        .rows()
        .iter()
        .map(|row| row[COL_GENENAME_GM].to_string())
        .collect()
}

#[test]
fn test_overlapping_gene_has_distance_zero() {
    let fixture = seeded_fixture();
    seed_user_input(&fixture, &[(1, "1", 1000, 2000, "rs1", 0.01)]);
    pipeline::run(&fixture.store, true).unwrap();

    let all = fixture
        .store
        .fetch(PROTEIN_CODING_GENES_ALL, None)
        .unwrap();
    let near = fixture.store.fetch(PROTEIN_CODING_GENES, None).unwrap();

    let gene1_all = all
        .rows()
        .iter()
        .find(|row| row[COL_GENENAME_GM].to_string() == "GENE1")
        .expect("GENE1 missing from the all-candidates set");
    assert_eq!(gene1_all[COL_DIST], Value::Int(0));
    assert!(gene_names(&near).contains(&"GENE1".to_string()));
}

#[test]
fn test_nearby_gene_uses_max_cross_difference() {
    let fixture = seeded_fixture();
    seed_user_input(&fixture, &[(1, "1", 1000, 2000, "rs1", 0.01)]);
    pipeline::run(&fixture.store, true).unwrap();

    let all = fixture
        .store
        .fetch(PROTEIN_CODING_GENES_ALL, None)
        .unwrap();
    let gene2 = all
        .rows()
        .iter()
        .find(|row| row[COL_GENENAME_GM].to_string() == "GENE2")
        .expect("GENE2 missing from the all-candidates set");
    // max(|1000 - 60000|, |2000 - 50000|) = 59000; the documented metric is
    // the maximum of the cross-differences, not the 48 kb endpoint gap.
    assert_eq!(gene2[COL_DIST], Value::Int(59_000));

    // 59000 < 100000, so GENE2 is also in the near set.
    let near = fixture.store.fetch(PROTEIN_CODING_GENES, None).unwrap();
    assert!(gene_names(&near).contains(&"GENE2".to_string()));
}

#[test]
fn test_gene_outside_broad_window_is_absent() {
    let fixture = seeded_fixture();
    seed_user_input(&fixture, &[(1, "1", 1000, 2000, "rs1", 0.01)]);
    pipeline::run(&fixture.store, true).unwrap();

    let all = fixture
        .store
        .fetch(PROTEIN_CODING_GENES_ALL, None)
        .unwrap();
    let near = fixture.store.fetch(PROTEIN_CODING_GENES, None).unwrap();
    assert!(!gene_names(&all).contains(&"GENE3".to_string()));
    assert!(!gene_names(&near).contains(&"GENE3".to_string()));
}

#[test]
fn test_non_protein_coding_gene_is_absent() {
    let fixture = seeded_fixture();
    seed_user_input(&fixture, &[(1, "1", 1000, 2000, "rs1", 0.01)]);
    pipeline::run(&fixture.store, true).unwrap();

    let all = fixture
        .store
        .fetch(PROTEIN_CODING_GENES_ALL, None)
        .unwrap();
    assert!(!gene_names(&all).contains(&"GENE4".to_string()));
}

#[test]
fn test_near_set_is_subset_of_all_set() {
    let fixture = seeded_fixture();
    seed_user_input(
        &fixture,
        &[(1, "1", 1000, 2000, "rs1", 0.01), (2, "1", 55_000, 56_000, "rs2", 0.5)],
    );
    pipeline::run(&fixture.store, true).unwrap();

    let all = fixture
        .store
        .fetch(PROTEIN_CODING_GENES_ALL, None)
        .unwrap();
    let near = fixture.store.fetch(PROTEIN_CODING_GENES, None).unwrap();

    assert_eq!(near.column_order(), all.column_order());
    for near_row in near.rows() {
        assert!(
            all.rows().iter().any(|all_row| all_row == near_row),
            "near row missing from the all set: {:?}",
            near_row
        );
    }
}

#[test]
fn test_user_input_normalization() {
    let fixture = seeded_fixture();
    seed_user_input(&fixture, &[(1, "1", 1000, 2000, "rs1", 0.01)]);
    pipeline::run(&fixture.store, true).unwrap();

    let user_input = fixture.store.fetch(USER_INPUT, None).unwrap();
    let order = user_input.column_order();
    assert_eq!(
        order,
        vec![
            "INPUTID", "CHR", "BP1", "BP2", "GENENAME", "SNPID", "PVALUE", "LOCATION",
            "UCSC_LINK"
        ]
    );

    let row = &user_input.rows()[0];
    assert_eq!(row[7], Value::Text("1:1,000-2,000".to_string()));
    let link = row[8].to_string();
    assert!(link.starts_with("HYPERLINK(\""));
    assert!(link.contains("position=1%3A1000-2000"));
}

#[test]
fn test_gwas_annotation_by_overlap() {
    let fixture = seeded_fixture();
    seed_user_input(&fixture, &[(1, "1", 1000, 2000, "rs1", 0.01)]);
    pipeline::run(&fixture.store, true).unwrap();

    let gwas = fixture.store.fetch(GWAS_CATALOG, None).unwrap();
    assert_eq!(gwas.len(), 1);
    let snp_index = gwas.schema().position("SNPID_GWAS").unwrap();
    let trait_index = gwas.schema().position("TRAIT_GWAS").unwrap();
    assert_eq!(gwas.rows()[0][snp_index], Value::Text("rs99".to_string()));
    assert_eq!(gwas.rows()[0][trait_index], Value::Text("height".to_string()));
}

#[test]
fn test_omim_annotation_by_gene_name() {
    let fixture = seeded_fixture();
    seed_user_input(&fixture, &[(1, "1", 1000, 2000, "rs1", 0.01)]);
    pipeline::run(&fixture.store, true).unwrap();

    let omim = fixture.store.fetch(OMIM, None).unwrap();
    // GENE1 and GENE2 are both near, but only GENE1 has an OMIM entry.
    assert_eq!(omim.len(), 1);
    let gene_index = omim.schema().position("GENENAME_GM").unwrap();
    let omim_gene_index = omim.schema().position("OMIMGENE_OMIM").unwrap();
    assert_eq!(omim.rows()[0][gene_index], Value::Text("GENE1".to_string()));
    assert_eq!(
        omim.rows()[0][omim_gene_index],
        Value::Text("OMIM:1".to_string())
    );
}

#[test]
fn test_rerun_with_overwrite_is_idempotent() {
    let fixture = seeded_fixture();
    seed_user_input(&fixture, &[(1, "1", 1000, 2000, "rs1", 0.01)]);
    pipeline::run(&fixture.store, true).unwrap();

    let first_all = fixture
        .store
        .fetch(PROTEIN_CODING_GENES_ALL, None)
        .unwrap();
    let first_user = fixture.store.fetch(USER_INPUT, None).unwrap();
    let first_gwas = fixture.store.fetch(GWAS_CATALOG, None).unwrap();

    pipeline::run(&fixture.store, true).unwrap();

    let second_all = fixture
        .store
        .fetch(PROTEIN_CODING_GENES_ALL, None)
        .unwrap();
    let second_user = fixture.store.fetch(USER_INPUT, None).unwrap();
    let second_gwas = fixture.store.fetch(GWAS_CATALOG, None).unwrap();

    assert_eq!(first_all.rows(), second_all.rows());
    assert_eq!(first_user.rows(), second_user.rows());
    assert_eq!(first_gwas.rows(), second_gwas.rows());
}

#[test]
fn test_candidates_ordered_by_input_then_coordinates() {
    let fixture = seeded_fixture();
    seed_user_input(
        &fixture,
        &[(2, "1", 55_000, 56_000, "rs2", 0.5), (1, "1", 1000, 2000, "rs1", 0.01)],
    );
    pipeline::run(&fixture.store, true).unwrap();

    let all = fixture
        .store
        .fetch(PROTEIN_CODING_GENES_ALL, None)
        .unwrap();
    let input_ids: Vec<i64> = all
        .rows()
        .iter()
        .map(|row| match row[0] {
            Value::Int(i) => i,
            _ => panic!("INPUTID should be an integer"),
        })
        .collect();
    let mut sorted = input_ids.clone();
    sorted.sort();
    assert_eq!(input_ids, sorted);
}
