//! Column metadata types produced by earlier pipeline stages.
//!
//! Everything in here is read-only input to discovery: the structural flags
//! come from schema introspection and the role/purpose tags come from the
//! column feature classifier that runs before relationship discovery.

use serde::{Deserialize, Serialize};

/// Maximum number of sample values carried on a profile.
pub const MAX_SAMPLE_VALUES: usize = 10;

/// Role assigned to a column by the feature classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    PrimaryKey,
    ForeignKey,
    Attribute,
    Dimension,
    Measure,
    #[serde(other)]
    Other,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::PrimaryKey => "primary_key",
            ColumnRole::ForeignKey => "foreign_key",
            ColumnRole::Attribute => "attribute",
            ColumnRole::Dimension => "dimension",
            ColumnRole::Measure => "measure",
            ColumnRole::Other => "other",
        }
    }
}

/// Purpose assigned to a column by the feature classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPurpose {
    Identifier,
    Timestamp,
    Flag,
    Measure,
    Enum,
    Text,
    Json,
    #[serde(other)]
    Other,
}

impl ColumnPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnPurpose::Identifier => "identifier",
            ColumnPurpose::Timestamp => "timestamp",
            ColumnPurpose::Flag => "flag",
            ColumnPurpose::Measure => "measure",
            ColumnPurpose::Enum => "enum",
            ColumnPurpose::Text => "text",
            ColumnPurpose::Json => "json",
            ColumnPurpose::Other => "other",
        }
    }
}

/// A target asserted for a column by the feature classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorInference {
    pub target_table: String,
    pub target_column: String,
    /// Classifier confidence (0.0 to 1.0).
    pub confidence: f64,
}

/// Everything known about one column before discovery starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    /// Table name, optionally schema-qualified (`sales.orders`).
    pub table: String,
    pub column: String,
    /// Declared type as reported by the database (e.g. `int4`, `varchar(64)`).
    pub data_type: String,
    #[serde(default)]
    pub is_primary_key: bool,
    /// Column carries a single-column uniqueness constraint.
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub distinct_count: Option<i64>,
    /// Fraction of NULL values (0.0 to 1.0).
    #[serde(default)]
    pub null_rate: Option<f64>,
    #[serde(default)]
    pub sample_values: Vec<String>,
    #[serde(default)]
    pub role: Option<ColumnRole>,
    #[serde(default)]
    pub purpose: Option<ColumnPurpose>,
    /// Flagged as joinable by earlier statistical analysis.
    #[serde(default)]
    pub is_joinable: bool,
    #[serde(default)]
    pub prior_inference: Option<PriorInference>,
}

impl ColumnProfile {
    /// Create a bare profile with no tags or statistics.
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            data_type: data_type.into(),
            is_primary_key: false,
            is_unique: false,
            distinct_count: None,
            null_rate: None,
            sample_values: Vec::new(),
            role: None,
            purpose: None,
            is_joinable: false,
            prior_inference: None,
        }
    }

    /// Get fully qualified name (table.column).
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }

    /// Case-insensitive identity check on table and column.
    pub fn is_same_column(&self, table: &str, column: &str) -> bool {
        self.table.eq_ignore_ascii_case(table) && self.column.eq_ignore_ascii_case(column)
    }

    /// Declared primary key or unique constraint.
    pub fn is_unique_key(&self) -> bool {
        self.is_primary_key || self.is_unique
    }
}

/// A foreign-key constraint declared in the database itself.
///
/// Multi-column constraints keep their column lists so they can be
/// recognised and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredForeignKey {
    pub name: String,
    pub source_table: String,
    pub source_columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
}

impl DeclaredForeignKey {
    /// Single-column constraint helper.
    pub fn single(
        name: impl Into<String>,
        source_table: impl Into<String>,
        source_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_table: source_table.into(),
            source_columns: vec![source_column.into()],
            target_table: target_table.into(),
            target_columns: vec![target_column.into()],
        }
    }

    pub fn is_composite(&self) -> bool {
        self.source_columns.len() != 1 || self.target_columns.len() != 1
    }
}

/// All column metadata for one project/datasource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub columns: Vec<ColumnProfile>,
    #[serde(default)]
    pub foreign_keys: Vec<DeclaredForeignKey>,
}

impl SchemaSnapshot {
    /// Look up a column profile, ignoring case.
    pub fn find_column(&self, table: &str, column: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.is_same_column(table, column))
    }
}
