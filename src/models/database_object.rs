//! # Database Object Model
//!
//! Discovered schema objects and the identifiers that key them.
//!
//! ## Overview
//!
//! A `DatabaseObject` is a snapshot of one object found in the source system: its
//! qualified name, kind, creation statement and complexity classification. Objects are
//! immutable once discovered within a job; re-discovery produces a new snapshot.
//!
//! ## Ordering
//!
//! `ObjectKind::rank()` drives the deterministic tie-break used by topological ordering:
//! tables first, then views, functions, procedures and triggers. Placeholder nodes for
//! objects outside the discovered set use the `External` kind and rank last.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Schema-qualified object identifier (`schema.name`), unique within a catalog
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    schema: String,
    name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match against a user-supplied selector: either the full `schema.name` or the bare name
    pub fn matches(&self, pattern: &str) -> bool {
        match pattern.split_once('.') {
            Some((schema, name)) => {
                self.schema.eq_ignore_ascii_case(schema) && self.name.eq_ignore_ascii_case(name)
            }
            None => self.name.eq_ignore_ascii_case(pattern),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
                Ok(Self::new(schema, name))
            }
            _ => Err(format!("Invalid qualified name (expected schema.name): {s}")),
        }
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

/// Kind of schema object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    View,
    Function,
    Procedure,
    Trigger,
    /// Placeholder for a referenced object outside the discovered set; never executed
    External,
}

impl ObjectKind {
    /// Creation rank used to break ties between otherwise unordered objects
    pub fn rank(&self) -> u8 {
        match self {
            Self::Table => 0,
            Self::View => 1,
            Self::Function => 2,
            Self::Procedure => 3,
            Self::Trigger => 4,
            Self::External => 5,
        }
    }

    pub fn is_executable(&self) -> bool {
        !matches!(self, Self::External)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
            Self::Function => write!(f, "function"),
            Self::Procedure => write!(f, "procedure"),
            Self::Trigger => write!(f, "trigger"),
            Self::External => write!(f, "external"),
        }
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "view" => Ok(Self::View),
            "function" => Ok(Self::Function),
            "procedure" => Ok(Self::Procedure),
            "trigger" => Ok(Self::Trigger),
            "external" => Ok(Self::External),
            _ => Err(format!("Invalid object kind: {s}")),
        }
    }
}

/// Complexity classification, ordered from simplest to hardest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    /// Line count above which a procedure is considered complex
    pub const COMPLEX_PROCEDURE_LINES: usize = 100;
    /// Line count above which a procedure is considered very complex
    pub const VERY_COMPLEX_PROCEDURE_LINES: usize = 500;

    /// Heuristic classification from kind, definition size and outgoing reference count.
    ///
    /// Tables that reference other objects (foreign keys) are moderate, plain tables simple.
    /// Views and functions are moderate. Procedures scale with their line count and
    /// triggers are always complex.
    pub fn classify(kind: ObjectKind, definition: &str, reference_count: usize) -> Self {
        match kind {
            ObjectKind::Table if reference_count > 0 => Self::Moderate,
            ObjectKind::Table | ObjectKind::External => Self::Simple,
            ObjectKind::View | ObjectKind::Function => Self::Moderate,
            ObjectKind::Procedure => {
                let lines = definition.lines().count();
                if lines > Self::VERY_COMPLEX_PROCEDURE_LINES {
                    Self::VeryComplex
                } else if lines > Self::COMPLEX_PROCEDURE_LINES {
                    Self::Complex
                } else {
                    Self::Moderate
                }
            }
            ObjectKind::Trigger => Self::Complex,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
            Self::VeryComplex => write!(f, "very_complex"),
        }
    }
}

impl Default for Complexity {
    fn default() -> Self {
        Self::Simple
    }
}

/// A single column as reported by a source or target system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnShape {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Declared structure of an object, used to check a converted definition against its source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectShape {
    pub columns: Vec<ColumnShape>,
    #[serde(default)]
    pub constraints: BTreeSet<String>,
}

impl ObjectShape {
    /// Differences between this (source) shape and a candidate shape.
    ///
    /// Column names and constraint names are compared case-insensitively; data types are
    /// not compared because the two systems use different type vocabularies.
    pub fn mismatches(&self, candidate: &ObjectShape) -> Vec<String> {
        let mut problems = Vec::new();

        for column in &self.columns {
            match candidate
                .columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                None => problems.push(format!("missing column {}", column.name)),
                Some(other) if other.nullable != column.nullable => problems.push(format!(
                    "column {} nullability differs (source nullable={}, candidate nullable={})",
                    column.name, column.nullable, other.nullable
                )),
                Some(_) => {}
            }
        }

        for column in &candidate.columns {
            if !self
                .columns
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                problems.push(format!("unexpected column {}", column.name));
            }
        }

        let normalize = |set: &BTreeSet<String>| -> BTreeSet<String> {
            set.iter().map(|c| c.to_ascii_lowercase()).collect()
        };
        let source_constraints = normalize(&self.constraints);
        let candidate_constraints = normalize(&candidate.constraints);
        for missing in source_constraints.difference(&candidate_constraints) {
            problems.push(format!("missing constraint {missing}"));
        }

        problems
    }
}

/// A discovered schema object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseObject {
    pub name: QualifiedName,
    pub kind: ObjectKind,
    /// Source creation statement; may be empty until the fetch phase retrieves it
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub complexity: Complexity,
}

impl DatabaseObject {
    pub fn new(
        name: QualifiedName,
        kind: ObjectKind,
        definition: impl Into<String>,
        complexity: Complexity,
    ) -> Self {
        Self {
            name,
            kind,
            definition: definition.into(),
            complexity,
        }
    }

    /// Unresolved placeholder for a referenced object outside the discovered set
    pub fn placeholder(name: QualifiedName) -> Self {
        Self {
            name,
            kind: ObjectKind::External,
            definition: String::new(),
            complexity: Complexity::Simple,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == ObjectKind::External
    }

    /// Hex SHA-256 of the source definition
    pub fn definition_hash(&self) -> String {
        hash_definition(&self.definition)
    }
}

/// Hex SHA-256 of a definition text
pub fn hash_definition(definition: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(definition.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_parsing() {
        let name: QualifiedName = "sales.orders".parse().unwrap();
        assert_eq!(name.schema(), "sales");
        assert_eq!(name.name(), "orders");
        assert_eq!(name.to_string(), "sales.orders");

        assert!("orders".parse::<QualifiedName>().is_err());
        assert!(".orders".parse::<QualifiedName>().is_err());
    }

    #[test]
    fn test_qualified_name_matching() {
        let name = QualifiedName::new("SALES", "Orders");
        assert!(name.matches("orders"));
        assert!(name.matches("sales.orders"));
        assert!(!name.matches("hr.orders"));
        assert!(!name.matches("customers"));
    }

    #[test]
    fn test_qualified_name_serde_as_string() {
        let name = QualifiedName::new("sales", "orders");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"sales.orders\"");
        let parsed: QualifiedName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_kind_rank_order() {
        assert!(ObjectKind::Table.rank() < ObjectKind::View.rank());
        assert!(ObjectKind::View.rank() < ObjectKind::Function.rank());
        assert!(ObjectKind::Function.rank() < ObjectKind::Procedure.rank());
        assert!(ObjectKind::Procedure.rank() < ObjectKind::Trigger.rank());
        assert!(!ObjectKind::External.is_executable());
    }

    #[test]
    fn test_complexity_classification() {
        assert_eq!(
            Complexity::classify(ObjectKind::Table, "", 0),
            Complexity::Simple
        );
        assert_eq!(
            Complexity::classify(ObjectKind::Table, "", 2),
            Complexity::Moderate
        );
        assert_eq!(
            Complexity::classify(ObjectKind::Trigger, "", 0),
            Complexity::Complex
        );

        let long_proc = "line\n".repeat(150);
        assert_eq!(
            Complexity::classify(ObjectKind::Procedure, &long_proc, 0),
            Complexity::Complex
        );
        let huge_proc = "line\n".repeat(600);
        assert_eq!(
            Complexity::classify(ObjectKind::Procedure, &huge_proc, 0),
            Complexity::VeryComplex
        );
        assert!(Complexity::VeryComplex > Complexity::Complex);
    }

    #[test]
    fn test_shape_mismatches() {
        let source = ObjectShape {
            columns: vec![
                ColumnShape {
                    name: "id".into(),
                    data_type: "NUMBER".into(),
                    nullable: false,
                },
                ColumnShape {
                    name: "note".into(),
                    data_type: "VARCHAR2".into(),
                    nullable: true,
                },
            ],
            constraints: ["PK_ORDERS".to_string()].into_iter().collect(),
        };
        let candidate = ObjectShape {
            columns: vec![ColumnShape {
                name: "ID".into(),
                data_type: "bigint".into(),
                nullable: true,
            }],
            constraints: ["pk_orders".to_string()].into_iter().collect(),
        };

        let problems = source.mismatches(&candidate);
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("nullability")));
        assert!(problems.iter().any(|p| p.contains("missing column note")));
        assert!(source.mismatches(&source).is_empty());
    }

    #[test]
    fn test_definition_hash_is_stable() {
        let obj = DatabaseObject::new(
            QualifiedName::new("s", "t"),
            ObjectKind::Table,
            "CREATE TABLE t (id INT)",
            Complexity::Simple,
        );
        assert_eq!(obj.definition_hash(), hash_definition("CREATE TABLE t (id INT)"));
        assert_eq!(obj.definition_hash().len(), 64);
    }
}
