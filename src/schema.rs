//! Schema catalog: named dataset templates with typed, ordered columns.
//!
//! The catalog is built once at startup and is immutable afterwards. Every
//! ingestion or query result works on a copy of a template; templates are
//! never mutated in place.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Raw user input, as ingested.
pub const USER_INPUT_RAW: &str = "_USER_INPUT";
/// Normalized user input (adds LOCATION and the browser hyperlink).
pub const USER_INPUT: &str = "USER_INPUT";
/// The gene catalog reference dataset.
pub const GENE_MASTER: &str = "GENE_MASTER";
/// View over the gene catalog with widened coordinate windows.
pub const GENE_MASTER_EXPANDED: &str = "GENE_MASTER_EXPANDED";
/// All protein-coding candidates within the broad window.
pub const PROTEIN_CODING_GENES_ALL: &str = "PROTEIN_CODING_GENES_ALL";
/// Near protein-coding candidates (distance cutoff applied).
pub const PROTEIN_CODING_GENES: &str = "PROTEIN_CODING_GENES";

/// Seeded reference datasets, named after their source files.
pub const GWAS_CATALOG_REF: &str = "_gwas_catalog";
pub const OMIM_REF: &str = "_omim";
pub const PSYCHIATRIC_CNVS_REF: &str = "_psychiatric_cnvs";
pub const ASD_GENES_REF: &str = "_asd_genes";
pub const ID_DEVDELAY_GENES_REF: &str = "_id_devdelay_genes";
pub const MOUSE_KNOCKOUT_REF: &str = "_mouse_knockout";

/// Annotated output datasets produced by the pipeline.
pub const GWAS_CATALOG: &str = "gwas_catalog";
pub const OMIM: &str = "omim";
pub const PSYCHIATRIC_CNVS: &str = "psychiatric_cnvs";
pub const ASD_GENES: &str = "asd_genes";
pub const ID_DEVDELAY_GENES: &str = "id_devdelay_genes";
pub const MOUSE_KNOCKOUT: &str = "mouse_knockout";

/// Column data types supported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Varchar,
    Double,
}

impl ColumnType {
    /// SQL type name used in CREATE TABLE statements.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Double => "DOUBLE",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Integer => "integer",
            ColumnType::Varchar => "varchar",
            ColumnType::Double => "double",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "integer" => Ok(ColumnType::Integer),
            "varchar" => Ok(ColumnType::Varchar),
            "double" => Ok(ColumnType::Double),
            other => Err(Error::type_mismatch(other, "unknown column type")),
        }
    }
}

/// A single typed column declaration.
///
/// `formula` marks values that spreadsheet output must render as a computed
/// formula; `hyperlink` marks clickable link formulas; `hidden` columns are
/// carried in exports but not displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: ColumnType,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub formula: bool,
    #[serde(default)]
    pub hyperlink: bool,
}

impl ColumnSpec {
    /// Create a plain column. Names are canonicalized to upper case.
    pub fn new(name: &str, data_type: ColumnType) -> Self {
        ColumnSpec {
            name: name.to_uppercase(),
            data_type,
            hidden: false,
            formula: false,
            hyperlink: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn formula(mut self) -> Self {
        self.formula = true;
        self
    }

    pub fn hyperlink(mut self) -> Self {
        self.hyperlink = true;
        self
    }
}

/// Storage scope of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Persisted on disk for the duration of the run and beyond.
    #[default]
    Persistent,
    /// Memory-resident while the connection is open.
    Memory,
    /// Visible only to the current connection.
    Local,
}

/// A dataset template: ordered, typed columns under an optional name.
///
/// A `None` name marks an anonymous template, copied and renamed per use.
#[derive(Debug, Clone)]
pub struct Schema {
    name: Option<String>,
    columns: IndexMap<String, ColumnSpec>,
    pub scope: Scope,
    pub temporary: bool,
}

impl Schema {
    /// Build a schema from columns in declaration order.
    ///
    /// Fails if the column list is empty or declares a name twice
    /// (case-insensitively).
    pub fn with_columns(name: Option<&str>, columns: Vec<ColumnSpec>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::type_mismatch(
                name.unwrap_or("<anonymous>"),
                "schema declares no columns",
            ));
        }
        let mut map = IndexMap::with_capacity(columns.len());
        for spec in columns {
            if map.insert(spec.name.clone(), spec.clone()).is_some() {
                return Err(Error::type_mismatch(
                    spec.name,
                    "column declared more than once",
                ));
            }
        }
        Ok(Schema {
            name: name.map(|n| n.to_string()),
            columns: map,
            scope: Scope::Persistent,
            temporary: false,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// A renamed deep copy; the template itself is left untouched.
    pub fn renamed(&self, name: &str) -> Schema {
        let mut copy = self.clone();
        copy.name = Some(name.to_string());
        copy
    }

    pub fn scoped(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Number of declared columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in declaration order.
    pub fn column_order(&self) -> Vec<&str> {
        self.columns.keys().map(|k| k.as_str()).collect()
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.values()
    }

    /// Positional index of a column, matched case-insensitively.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.get_index_of(&name.to_uppercase())
    }

    /// Column spec by name, matched case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.get(&name.to_uppercase())
    }

    /// Column spec by declaration position.
    pub fn column_at(&self, index: usize) -> Option<&ColumnSpec> {
        self.columns.get_index(index).map(|(_, spec)| spec)
    }

    /// Instantiate a fresh working record bound to a copy of this schema.
    pub fn new_record(&self) -> crate::record::TabularRecord {
        crate::record::TabularRecord::new(self)
    }
}

/// The immutable catalog of dataset templates.
///
/// Named templates are looked up by dataset name; the three anonymous
/// templates (reference, link, reduced link) are exposed as fields because
/// they are cloned and renamed per use rather than addressed by name.
#[derive(Debug)]
pub struct Catalog {
    schemas: IndexMap<String, Schema>,
    reference: Schema,
    link: Schema,
    reduced_link: Schema,
}

impl Catalog {
    /// Declare a named template. Re-declaring a name is a construction bug.
    fn define(&mut self, schema: Schema) -> Result<()> {
        let name = schema
            .name()
            .ok_or_else(|| Error::type_mismatch("<anonymous>", "catalog templates must be named"))?
            .to_string();
        if self.schemas.insert(name.clone(), schema).is_some() {
            return Err(Error::DuplicateDataset(name));
        }
        Ok(())
    }

    /// Look up a named template.
    pub fn lookup(&self, name: &str) -> Result<&Schema> {
        self.schemas
            .get(name)
            .ok_or_else(|| Error::DatasetNotFound(name.to_string()))
    }

    /// Instantiate a fresh working record for a named template.
    pub fn new_record(&self, name: &str) -> Result<crate::record::TabularRecord> {
        Ok(self.lookup(name)?.new_record())
    }

    /// The anonymous reference template (chromosome, coordinates, gene name),
    /// cloned and renamed per ingested reference file.
    pub fn reference_template(&self) -> &Schema {
        &self.reference
    }

    /// Styling template for annotated outputs carrying the browser link.
    pub fn link_template(&self) -> &Schema {
        &self.link
    }

    /// Link template plus the four hidden join-provenance columns.
    pub fn reduced_link_template(&self) -> &Schema {
        &self.reduced_link
    }

    /// Construct the fixed catalog used by every run.
    pub fn builtin() -> Result<Catalog> {
        use ColumnType::{Double, Integer, Varchar};

        let input_columns = || {
            vec![
                ColumnSpec::new("INPUTID", Integer),
                ColumnSpec::new("CHR", Varchar),
                ColumnSpec::new("BP1", Integer),
                ColumnSpec::new("BP2", Integer),
                ColumnSpec::new("GENENAME", Varchar),
                ColumnSpec::new("SNPID", Varchar),
                ColumnSpec::new("PVALUE", Double),
            ]
        };
        let ucsc_link = || ColumnSpec::new("UCSC_LINK", Varchar).formula().hyperlink();
        let region_columns = || {
            vec![
                ColumnSpec::new("CHR", Varchar),
                ColumnSpec::new("BP1", Integer),
                ColumnSpec::new("BP2", Integer),
                ColumnSpec::new("GENENAME", Varchar),
            ]
        };

        let reference = Schema::with_columns(None, region_columns())?;

        let mut link_columns = input_columns();
        link_columns.push(ucsc_link());
        let link = Schema::with_columns(None, link_columns)?;

        let mut reduced_columns: Vec<ColumnSpec> = link.columns().cloned().collect();
        reduced_columns.push(ColumnSpec::new("ENTREZ_GM", Integer).hidden());
        reduced_columns.push(ColumnSpec::new("ENSEMBL_GM", Varchar).hidden());
        reduced_columns.push(ColumnSpec::new("TTYPE_GM", Varchar).hidden());
        reduced_columns.push(ColumnSpec::new("STRAND_GM", Varchar).hidden());
        let reduced_link = Schema::with_columns(None, reduced_columns)?;

        let mut catalog = Catalog {
            schemas: IndexMap::new(),
            reference,
            link,
            reduced_link,
        };

        catalog.define(
            Schema::with_columns(Some(USER_INPUT_RAW), input_columns())?.scoped(Scope::Local),
        )?;

        let mut user_input_columns = input_columns();
        user_input_columns.push(ColumnSpec::new("LOCATION", Varchar));
        user_input_columns.push(ucsc_link());
        catalog.define(
            Schema::with_columns(Some(USER_INPUT), user_input_columns)?.scoped(Scope::Local),
        )?;

        catalog.define(Schema::with_columns(
            Some(GENE_MASTER),
            vec![
                ColumnSpec::new("CHR", Varchar),
                ColumnSpec::new("BP1", Integer),
                ColumnSpec::new("BP2", Integer),
                ColumnSpec::new("GENENAME", Varchar),
                ColumnSpec::new("ENTREZ", Integer),
                ColumnSpec::new("ENSEMBL", Varchar),
                ColumnSpec::new("TTYPE", Varchar),
                ColumnSpec::new("STRAND", Varchar),
                ColumnSpec::new("PRODUCT", Varchar),
            ],
        )?)?;

        // Reference datasets carry their dataset-specific columns beyond the
        // anonymous reference template, because the pipeline projects them.
        let mut gwas = region_columns();
        gwas.push(ColumnSpec::new("SNPID", Varchar));
        gwas.push(ColumnSpec::new("PVALUE", Double));
        gwas.push(ColumnSpec::new("PMID", Integer));
        gwas.push(ColumnSpec::new("TRAIT", Varchar));
        catalog.define(Schema::with_columns(Some(GWAS_CATALOG_REF), gwas)?)?;

        let mut omim = region_columns();
        omim.push(ColumnSpec::new("OMIMGENE", Varchar));
        omim.push(ColumnSpec::new("OMIMDISEASE", Varchar));
        omim.push(ColumnSpec::new("TYPE", Varchar));
        catalog.define(Schema::with_columns(Some(OMIM_REF), omim)?)?;

        let mut cnvs = region_columns();
        cnvs.push(ColumnSpec::new("DISEASE", Varchar));
        cnvs.push(ColumnSpec::new("TYPE", Varchar));
        cnvs.push(ColumnSpec::new("NOTE", Varchar));
        catalog.define(Schema::with_columns(Some(PSYCHIATRIC_CNVS_REF), cnvs)?)?;

        let mut asd = region_columns();
        asd.push(ColumnSpec::new("TYPE", Varchar));
        catalog.define(Schema::with_columns(Some(ASD_GENES_REF), asd)?)?;

        let mut id_dd = region_columns();
        id_dd.push(ColumnSpec::new("TYPE", Varchar));
        catalog.define(Schema::with_columns(Some(ID_DEVDELAY_GENES_REF), id_dd)?)?;

        let mut mouse = region_columns();
        mouse.push(ColumnSpec::new("MUSNAME", Varchar));
        mouse.push(ColumnSpec::new("PHENOTYPE", Varchar));
        catalog.define(Schema::with_columns(Some(MOUSE_KNOCKOUT_REF), mouse)?)?;

        Ok(catalog)
    }
}
