//! Column type affinity from declared type names.
//!
//! Mirrors the engine's own inference rules, applied in order to the
//! upper-cased declared name:
//!
//! | Rule | Contains                  | Affinity  |
//! |------|---------------------------|-----------|
//! | 1    | `INT`                     | Integer   |
//! | 2    | `CHAR`, `CLOB`, `TEXT`    | Text      |
//! | 3    | `BLOB`, or no declaration | Blob      |
//! | 4    | `REAL`, `FLOA`, `DOUB`    | Real      |
//! | 5    | anything else             | Numeric   |

use super::value::StorageClass;

/// Column affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

impl Affinity {
    /// Infer the affinity of a declared column type.
    #[must_use]
    pub fn from_declared_type(declared: Option<&str>) -> Self {
        let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) else {
            return Self::Blob;
        };
        let upper = declared.to_ascii_uppercase();
        let has = |needle: &str| upper.contains(needle);

        if has("INT") {
            Self::Integer
        } else if has("CHAR") || has("CLOB") || has("TEXT") {
            Self::Text
        } else if has("BLOB") {
            Self::Blob
        } else if has("REAL") || has("FLOA") || has("DOUB") {
            Self::Real
        } else {
            Self::Numeric
        }
    }

    /// Storage class that values in a column of this affinity naturally take.
    ///
    /// `None` for `Numeric`, whose values may be stored as integer, real or
    /// text depending on what was inserted.
    #[must_use]
    pub const fn storage_class(self) -> Option<StorageClass> {
        match self {
            Self::Integer => Some(StorageClass::Integer),
            Self::Text => Some(StorageClass::Text),
            Self::Blob => Some(StorageClass::Blob),
            Self::Real => Some(StorageClass::Real),
            Self::Numeric => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_rules() {
        let cases = [
            (Some("INTEGER"), Affinity::Integer),
            (Some("bigint"), Affinity::Integer),
            (Some("UNSIGNED BIG INT"), Affinity::Integer),
            (Some("VARCHAR(255)"), Affinity::Text),
            (Some("nchar(5)"), Affinity::Text),
            (Some("CLOB"), Affinity::Text),
            (Some("TEXT"), Affinity::Text),
            (Some("BLOB"), Affinity::Blob),
            (None, Affinity::Blob),
            (Some("  "), Affinity::Blob),
            (Some("REAL"), Affinity::Real),
            (Some("FLOAT"), Affinity::Real),
            (Some("DOUBLE PRECISION"), Affinity::Real),
            (Some("NUMERIC"), Affinity::Numeric),
            (Some("DECIMAL(10,5)"), Affinity::Numeric),
            (Some("DATETIME"), Affinity::Numeric),
        ];
        for (declared, expected) in cases {
            assert_eq!(Affinity::from_declared_type(declared), expected, "{declared:?}");
        }
    }

    #[test]
    fn test_rule_order() {
        // "INT" wins over "CHAR" and "POINT" contains "INT"
        assert_eq!(Affinity::from_declared_type(Some("CHARINT")), Affinity::Integer);
        assert_eq!(Affinity::from_declared_type(Some("FLOATING POINT")), Affinity::Integer);
    }

    #[test]
    fn test_storage_class() {
        assert_eq!(Affinity::Real.storage_class(), Some(StorageClass::Real));
        assert_eq!(Affinity::Numeric.storage_class(), None);
    }
}
