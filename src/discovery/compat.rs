//! Type compatibility for candidate pairs.
//!
//! Declared column types are normalised into families and checked against a
//! fixed matrix. A pair is compatible only on an exact family match or on one
//! of the widening pairs listed in [`WIDENINGS`]; everything else, including
//! every cross-family pair, is rejected.

use std::fmt;

/// Normalised family of a declared SQL type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Float,
    Char,
    Varchar,
    Text,
    Uuid,
    Boolean,
    Date,
    Timestamp,
    Json,
    Binary,
    /// Anything unrecognised, keyed by its lowercased base name.
    Other(String),
}

/// Widening pairs accepted in the source → target direction.
pub const WIDENINGS: &[(TypeFamily, TypeFamily)] = &[
    (TypeFamily::SmallInt, TypeFamily::Integer),
    (TypeFamily::SmallInt, TypeFamily::BigInt),
    (TypeFamily::Integer, TypeFamily::BigInt),
    (TypeFamily::Char, TypeFamily::Varchar),
    (TypeFamily::Char, TypeFamily::Text),
    (TypeFamily::Varchar, TypeFamily::Text),
];

impl TypeFamily {
    /// Parse a declared type such as `character varying(255)` or `INT8`.
    pub fn parse(declared: &str) -> Self {
        let lowered = declared.trim().to_ascii_lowercase();
        let base = match lowered.find('(') {
            Some(idx) => lowered[..idx].trim_end(),
            None => lowered.as_str(),
        };
        let base = base
            .trim_end_matches(" unsigned")
            .trim_end_matches("[]")
            .trim();

        match base {
            "smallint" | "int2" | "tinyint" | "smallserial" | "serial2" => Self::SmallInt,
            "integer" | "int" | "int4" | "mediumint" | "serial" | "serial4" => Self::Integer,
            "bigint" | "int8" | "bigserial" | "serial8" | "hugeint" => Self::BigInt,
            "numeric" | "decimal" | "number" | "money" => Self::Decimal,
            "real" | "float" | "float4" | "float8" | "double" | "double precision" => {
                Self::Float
            }
            "char" | "character" | "nchar" | "bpchar" => Self::Char,
            "varchar" | "character varying" | "nvarchar" | "varchar2" | "string" => {
                Self::Varchar
            }
            "text" | "ntext" | "clob" | "mediumtext" | "longtext" | "citext" => Self::Text,
            "uuid" | "uniqueidentifier" => Self::Uuid,
            "boolean" | "bool" | "bit" => Self::Boolean,
            "date" => Self::Date,
            "json" | "jsonb" | "variant" => Self::Json,
            "bytea" | "blob" | "binary" | "varbinary" => Self::Binary,
            b if b.starts_with("timestamp")
                || b.starts_with("datetime")
                || b == "smalldatetime"
                || b == "timestamptz" =>
            {
                Self::Timestamp
            }
            other => Self::Other(other.to_string()),
        }
    }

    /// Families that can never act as a foreign-key source.
    pub fn is_excluded_source(&self) -> bool {
        matches!(self, Self::Timestamp | Self::Boolean | Self::Json)
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(name) => write!(f, "{}", name),
            family => write!(f, "{}", format!("{:?}", family).to_ascii_lowercase()),
        }
    }
}

/// Result of a type compatibility check.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCompatibility {
    /// Families are identical.
    pub is_exact: bool,

    /// The pair may be joined.
    pub is_compatible: bool,

    /// Human-readable explanation.
    pub explanation: String,
}

impl TypeCompatibility {
    /// Check whether a source column of `from` may reference a target of `to`.
    pub fn check(from: &str, to: &str) -> Self {
        let source = TypeFamily::parse(from);
        let target = TypeFamily::parse(to);

        if source == target {
            return Self {
                is_exact: true,
                is_compatible: true,
                explanation: format!("{} matches {}", source, target),
            };
        }

        let widens = WIDENINGS.iter().any(|(s, t)| *s == source && *t == target);
        Self {
            is_exact: false,
            is_compatible: widens,
            explanation: if widens {
                format!("{} widens to {}", source, target)
            } else {
                format!("{} is not compatible with {}", source, target)
            },
        }
    }

    pub fn compatible(from: &str, to: &str) -> bool {
        Self::check(from, to).is_compatible
    }
}
