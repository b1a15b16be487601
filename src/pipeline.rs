//! The annotation pipeline: the fixed, ordered sequence of derived-table
//! and view builds that joins user input against the reference datasets.
//!
//! Each stage depends only on tables committed by prior stages and commits
//! before the next stage begins. The store has no query optimizer of its
//! own, so every created table is indexed on the columns the next stage
//! filters or joins on; a failed index degrades performance, not
//! correctness, and is logged rather than propagated.

use tracing::{info, warn};

use crate::error::Result;
use crate::query::{distance_sql, overlap_sql, Query};
use crate::schema::{
    ASD_GENES, ASD_GENES_REF, GENE_MASTER, GENE_MASTER_EXPANDED, GWAS_CATALOG, GWAS_CATALOG_REF,
    ID_DEVDELAY_GENES, ID_DEVDELAY_GENES_REF, MOUSE_KNOCKOUT, MOUSE_KNOCKOUT_REF, OMIM, OMIM_REF,
    PROTEIN_CODING_GENES, PROTEIN_CODING_GENES_ALL, PSYCHIATRIC_CNVS, PSYCHIATRIC_CNVS_REF,
    USER_INPUT, USER_INPUT_RAW,
};
use crate::store::{DataStore, TableSource};

/// Margin of the narrow gene window (±20 kb).
pub const NEAR_WINDOW_BP: i64 = 20_000;
/// Margin of the broad pre-filter window (±10 Mb).
pub const FAR_WINDOW_BP: i64 = 10_000_000;
/// Candidates closer than this are "near" protein-coding genes.
pub const NEAR_DISTANCE_BP: i64 = 100_000;

/// External genome browser targeted by the per-region hyperlink.
const GENOME_BROWSER_URL: &str =
    "http://genome.ucsc.edu/cgi-bin/hgTracks?&org=Human&db=hg19";

/// Business columns of the user input, indexed on both input tables.
const INPUT_COLUMNS: [&str; 7] = [
    "INPUTID", "CHR", "BP1", "BP2", "GENENAME", "SNPID", "PVALUE",
];

/// Run every stage in order. Assumes the raw user input and the reference
/// datasets are already seeded.
pub fn run(store: &DataStore, overwrite: bool) -> Result<()> {
    info!("operating");
    normalize_user_input(store, overwrite)?;
    expand_gene_master(store)?;
    build_protein_coding_all(store, overwrite)?;
    build_protein_coding_near(store)?;
    annotate_gwas_catalog(store, overwrite)?;
    annotate_omim(store, overwrite)?;
    annotate_psychiatric_cnvs(store, overwrite)?;
    annotate_asd_genes(store, overwrite)?;
    annotate_id_devdelay_genes(store, overwrite)?;
    annotate_mouse_knockout(store, overwrite)?;
    info!("operations done");
    Ok(())
}

/// SQL expression for the `chr:bp1-bp2` location label with grouped digits.
fn location_sql(chr: &str, bp1: &str, bp2: &str) -> String {
    format!("{chr} || ':' || GROUP_DIGITS({bp1}) || '-' || GROUP_DIGITS({bp2})")
}

/// SQL expression producing the genome-browser HYPERLINK formula string.
fn browser_link_sql(chr: &str, bp1: &str, bp2: &str) -> String {
    format!(
        "'HYPERLINK(\"{url}&position=' || {chr} || '%3A' || {bp1} || '-' || {bp2} \
         || '\",\"ucsc\")'",
        url = GENOME_BROWSER_URL
    )
}

/// Join predicate for gene-name annotation: equal, non-null, non-empty on
/// both sides.
fn gene_name_match(left: &str, right: &str) -> String {
    format!(
        "{left} = {right} AND {left} IS NOT NULL AND {left} != '' \
         AND {right} IS NOT NULL AND {right} != ''"
    )
}

fn index_columns(store: &DataStore, dataset: &str, columns: &[&str]) {
    for &column in columns {
        if let Err(e) = store.create_index(dataset, column) {
            warn!(dataset, column, error = %e, "index creation failed");
        }
    }
}

/// Stage 1: project the raw input unchanged, add the location label and the
/// browser link, in deterministic input order.
fn normalize_user_input(store: &DataStore, overwrite: bool) -> Result<()> {
    index_columns(store, USER_INPUT_RAW, &INPUT_COLUMNS);

    let query = Query::new()
        .select("c.*")
        .select_as(&location_sql("c.CHR", "c.BP1", "c.BP2"), "LOCATION")
        .select_as(&browser_link_sql("c.CHR", "c.BP1", "c.BP2"), "UCSC_LINK")
        .from(USER_INPUT_RAW, "c")
        .order_by("INPUTID, CHR, BP1, BP2");
    store.create_table(USER_INPUT, TableSource::Query(&query), overwrite)?;
    store.commit()?;
    index_columns(store, USER_INPUT, &INPUT_COLUMNS);
    info!(dataset = USER_INPUT, "stage done");
    Ok(())
}

/// Stage 2: gene rows widened by the narrow and broad margins, as a view.
fn expand_gene_master(store: &DataStore) -> Result<()> {
    let query = Query::new()
        .select("g.*")
        .select_as(&format!("(g.BP1 - {NEAR_WINDOW_BP})"), "BP1S20K_GM")
        .select_as(&format!("(g.BP2 + {NEAR_WINDOW_BP})"), "BP2A20K_GM")
        .select_as(&format!("(g.BP1 - {FAR_WINDOW_BP})"), "BP1S10M_GM")
        .select_as(&format!("(g.BP2 + {FAR_WINDOW_BP})"), "BP2A10M_GM")
        .from(GENE_MASTER, "g");
    store.create_view(GENE_MASTER_EXPANDED, &query)?;
    store.commit()?;
    info!(dataset = GENE_MASTER_EXPANDED, "stage done");
    Ok(())
}

/// Stage 3: every protein-coding gene whose broad window overlaps the
/// input, with the ranking distance.
fn build_protein_coding_all(store: &DataStore, overwrite: bool) -> Result<()> {
    let join = format!(
        "g.TTYPE = 'protein_coding' AND c.CHR = g.CHR AND {}",
        overlap_sql("c.BP1", "c.BP2", "g.BP1S10M_GM", "g.BP2A10M_GM")
    );
    let query = Query::new()
        .select("c.*")
        .select_as("g.BP1", "BP1_GM")
        .select_as("g.BP2", "BP2_GM")
        .select_as("g.GENENAME", "GENENAME_GM")
        .select_as("g.ENTREZ", "ENTREZ_GM")
        .select_as("g.ENSEMBL", "ENSEMBL_GM")
        .select_as("g.TTYPE", "TTYPE_GM")
        .select_as("g.STRAND", "STRAND_GM")
        .select_as("g.PRODUCT", "PRODUCT_GM")
        .select_as(&distance_sql("c.BP1", "c.BP2", "g.BP1", "g.BP2"), "DIST")
        .from(USER_INPUT_RAW, "c")
        .inner_join(GENE_MASTER_EXPANDED, "g", &join)
        .order_by("INPUTID, CHR, BP1, BP2");
    store.create_table(PROTEIN_CODING_GENES_ALL, TableSource::Query(&query), overwrite)?;
    store.commit()?;
    index_columns(
        store,
        PROTEIN_CODING_GENES_ALL,
        &[
            "INPUTID",
            "CHR",
            "BP1",
            "BP2",
            "PVALUE",
            "BP1_GM",
            "BP2_GM",
            "GENENAME_GM",
            "ENTREZ_GM",
            "ENSEMBL_GM",
            "TTYPE_GM",
            "STRAND_GM",
        ],
    );
    info!(dataset = PROTEIN_CODING_GENES_ALL, "stage done");
    Ok(())
}

/// Stage 4: the near candidates, ranked by distance then gene stable id.
fn build_protein_coding_near(store: &DataStore) -> Result<()> {
    let query = Query::new()
        .select("g.*")
        .from(PROTEIN_CODING_GENES_ALL, "g")
        .filter(&format!("DIST < {NEAR_DISTANCE_BP}"))
        .order_by("INPUTID, DIST, ENSEMBL_GM");
    store.create_view(PROTEIN_CODING_GENES, &query)?;
    store.commit()?;
    info!(dataset = PROTEIN_CODING_GENES, "stage done");
    Ok(())
}

/// Stage 5a: GWAS catalog hits by coordinate overlap.
fn annotate_gwas_catalog(store: &DataStore, overwrite: bool) -> Result<()> {
    let join = format!(
        "c.CHR = r.CHR AND {}",
        overlap_sql("c.BP1", "c.BP2", "r.BP1", "r.BP2")
    );
    let query = Query::new()
        .select("c.*")
        .select_as("r.BP1", "BP1_GWAS")
        .select_as("r.SNPID", "SNPID_GWAS")
        .select_as("r.PVALUE", "PVALUE_GWAS")
        .select_as("r.PMID", "PMID_GWAS")
        .select_as("r.TRAIT", "TRAIT_GWAS")
        .from(USER_INPUT_RAW, "c")
        .inner_join(GWAS_CATALOG_REF, "r", &join)
        .order_by("INPUTID, PVALUE_GWAS, SNPID_GWAS");
    store.create_table(GWAS_CATALOG, TableSource::Query(&query), overwrite)?;
    store.commit()?;
    info!(dataset = GWAS_CATALOG, "stage done");
    Ok(())
}

/// Stage 5b: OMIM entries by gene name.
fn annotate_omim(store: &DataStore, overwrite: bool) -> Result<()> {
    let query = Query::new()
        .select("g.*")
        .select_as("r.OMIMGENE", "OMIMGENE_OMIM")
        .select_as("r.OMIMDISEASE", "OMIMDISEASE_OMIM")
        .select_as("r.TYPE", "TYPE_OMIM")
        .from(PROTEIN_CODING_GENES, "g")
        .inner_join(OMIM_REF, "r", &gene_name_match("g.GENENAME_GM", "r.GENENAME"))
        .order_by("INPUTID, DIST, OMIMGENE_OMIM, GENENAME_GM");
    store.create_table(OMIM, TableSource::Query(&query), overwrite)?;
    store.commit()?;
    info!(dataset = OMIM, "stage done");
    Ok(())
}

/// Stage 5c: psychiatric CNVs by coordinate overlap.
fn annotate_psychiatric_cnvs(store: &DataStore, overwrite: bool) -> Result<()> {
    let join = format!(
        "c.CHR = r.CHR AND {}",
        overlap_sql("c.BP1", "c.BP2", "r.BP1", "r.BP2")
    );
    let query = Query::new()
        .select("c.*")
        .select_as("r.CHR", "CHR_R")
        .select_as("r.BP1", "BP1_R")
        .select_as("r.BP2", "BP2_R")
        .select_as("r.DISEASE", "DISEASE_R")
        .select_as("r.TYPE", "TYPE_R")
        .select_as("r.NOTE", "NOTE_R")
        .from(USER_INPUT_RAW, "c")
        .inner_join(PSYCHIATRIC_CNVS_REF, "r", &join)
        .order_by("INPUTID, DISEASE_R, TYPE_R");
    store.create_table(PSYCHIATRIC_CNVS, TableSource::Query(&query), overwrite)?;
    store.commit()?;
    info!(dataset = PSYCHIATRIC_CNVS, "stage done");
    Ok(())
}

/// Stage 5d: ASD genes by gene name.
fn annotate_asd_genes(store: &DataStore, overwrite: bool) -> Result<()> {
    let query = Query::new()
        .select("g.*")
        .select_as("r.TYPE", "TYPE_ASD")
        .from(PROTEIN_CODING_GENES, "g")
        .inner_join(ASD_GENES_REF, "r", &gene_name_match("g.GENENAME_GM", "r.GENENAME"))
        .order_by("INPUTID, DIST, TYPE_ASD, GENENAME_GM");
    store.create_table(ASD_GENES, TableSource::Query(&query), overwrite)?;
    store.commit()?;
    info!(dataset = ASD_GENES, "stage done");
    Ok(())
}

/// Stage 5e: ID/developmental-delay genes by gene name.
fn annotate_id_devdelay_genes(store: &DataStore, overwrite: bool) -> Result<()> {
    let query = Query::new()
        .select("g.*")
        .select_as("r.TYPE", "TYPE_ID_DD")
        .from(PROTEIN_CODING_GENES, "g")
        .inner_join(
            ID_DEVDELAY_GENES_REF,
            "r",
            &gene_name_match("g.GENENAME_GM", "r.GENENAME"),
        )
        .order_by("INPUTID, DIST, TYPE_ID_DD, GENENAME_GM");
    store.create_table(ID_DEVDELAY_GENES, TableSource::Query(&query), overwrite)?;
    store.commit()?;
    info!(dataset = ID_DEVDELAY_GENES, "stage done");
    Ok(())
}

/// Stage 5f: mouse-knockout phenotypes by gene name.
fn annotate_mouse_knockout(store: &DataStore, overwrite: bool) -> Result<()> {
    let query = Query::new()
        .select("g.*")
        .select_as("r.MUSNAME", "MUSNAME_R")
        .select_as("r.PHENOTYPE", "PHENOTYPE_R")
        .from(PROTEIN_CODING_GENES, "g")
        .inner_join(
            MOUSE_KNOCKOUT_REF,
            "r",
            &gene_name_match("g.GENENAME_GM", "r.GENENAME"),
        )
        .order_by("INPUTID, DIST, ENSEMBL_GM");
    store.create_table(MOUSE_KNOCKOUT, TableSource::Query(&query), overwrite)?;
    store.commit()?;
    info!(dataset = MOUSE_KNOCKOUT, "stage done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_sql() {
        assert_eq!(
            location_sql("c.CHR", "c.BP1", "c.BP2"),
            "c.CHR || ':' || GROUP_DIGITS(c.BP1) || '-' || GROUP_DIGITS(c.BP2)"
        );
    }

    #[test]
    fn test_browser_link_sql_is_balanced() {
        let sql = browser_link_sql("c.CHR", "c.BP1", "c.BP2");
        assert!(sql.starts_with("'HYPERLINK(\""));
        assert!(sql.ends_with("'\",\"ucsc\")'"));
        assert_eq!(sql.matches("||").count(), 6);
        assert!(sql.contains(GENOME_BROWSER_URL));
    }

    #[test]
    fn test_gene_name_match_requires_both_sides() {
        let sql = gene_name_match("g.GENENAME_GM", "r.GENENAME");
        assert!(sql.contains("g.GENENAME_GM = r.GENENAME"));
        assert!(sql.contains("g.GENENAME_GM IS NOT NULL"));
        assert!(sql.contains("r.GENENAME != ''"));
    }
}
