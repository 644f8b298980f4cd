//! Programmable objects as extracted from a target database, plus the
//! normalization and hashing rules that define definition equality.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of programmable object, stored as a short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Procedure,
    View,
    ScalarFunction,
    TableFunction,
    InlineFunction,
}

impl ObjectKind {
    /// Short code used in the repository and in CLI filters.
    pub fn code(&self) -> &'static str {
        match self {
            ObjectKind::Procedure => "P",
            ObjectKind::View => "V",
            ObjectKind::ScalarFunction => "FN",
            ObjectKind::TableFunction => "TF",
            ObjectKind::InlineFunction => "IF",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "P" => Some(ObjectKind::Procedure),
            "V" => Some(ObjectKind::View),
            "FN" => Some(ObjectKind::ScalarFunction),
            "TF" => Some(ObjectKind::TableFunction),
            "IF" => Some(ObjectKind::InlineFunction),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectKind::Procedure => "procedure",
            ObjectKind::View => "view",
            ObjectKind::ScalarFunction => "scalar function",
            ObjectKind::TableFunction => "table function",
            ObjectKind::InlineFunction => "inline function",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.code())
    }
}

/// A programmable object as read from a target's module catalog.
///
/// Not persisted as-is; the scanner converts it into a snapshot row plus a
/// definition row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammableObject {
    pub schema: String,
    pub name: String,
    pub kind: ObjectKind,
    /// Raw definition text. Empty when the server withholds the source.
    pub definition: String,
    /// Modification timestamp as reported by the server.
    pub last_modified: DateTime<Utc>,
}

impl ProgrammableObject {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn normalized_definition(&self) -> String {
        normalize_definition(&self.definition)
    }

    /// Hex SHA-256 over the normalized definition. Canonical equality key
    /// for two versions of an object.
    pub fn definition_hash(&self) -> String {
        definition_hash(&self.definition)
    }
}

/// Canonicalize a definition: CRLF to LF, right-trim every line, drop
/// blank-only lines, join with LF. Idempotent.
pub fn normalize_definition(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split('\n')
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hex SHA-256 of the UTF-8 bytes of the normalized definition.
pub fn definition_hash(text: &str) -> String {
    let normalized = normalize_definition(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Normalize a full name for lookups. All full-name keys in the detector,
/// comparator and filters go through this one function.
pub fn normalize_key(full_name: &str) -> String {
    full_name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        for kind in [
            ObjectKind::Procedure,
            ObjectKind::View,
            ObjectKind::ScalarFunction,
            ObjectKind::TableFunction,
            ObjectKind::InlineFunction,
        ] {
            assert_eq!(ObjectKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ObjectKind::from_code("fn"), Some(ObjectKind::ScalarFunction));
        assert_eq!(ObjectKind::from_code("X"), None);
    }

    #[test]
    fn normalize_strips_blank_lines_and_trailing_space() {
        let raw = "CREATE VIEW v AS  \r\n\r\n  SELECT 1;   \n\n";
        assert_eq!(normalize_definition(raw), "CREATE VIEW v AS\n  SELECT 1;");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "single",
            "a\r\nb\r\n",
            "  leading kept\n\ttab line\t\n",
            "x\n\n\n\ny",
        ];
        for s in samples {
            let once = normalize_definition(s);
            assert_eq!(normalize_definition(&once), once);
        }
    }

    #[test]
    fn hash_depends_only_on_normalized_form() {
        let a = "SELECT 1;\r\n";
        let b = "SELECT 1;   \n\n";
        assert_eq!(definition_hash(a), definition_hash(b));
        assert_ne!(definition_hash("SELECT 1;"), definition_hash("SELECT 2;"));
    }

    #[test]
    fn empty_definitions_hash_equal() {
        assert_eq!(definition_hash(""), definition_hash("\r\n  \n"));
    }

    #[test]
    fn key_normalizer_is_case_insensitive() {
        assert_eq!(normalize_key("Dbo.GetOrders"), normalize_key("dbo.getorders"));
    }
}
