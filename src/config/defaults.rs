use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::sql::{MAX_LIMIT, SimilarityMetric};

/// Facade-wide defaults applied when a request leaves a field unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct OperationDefaults {
    /// Table used when a request names none.
    #[serde(default)]
    pub table: Option<String>,

    /// Embedding column used when a request names none.
    #[serde(default)]
    pub column: Option<String>,

    /// Primary key column for upserts and created tables.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Distance metric for searches and index creation.
    #[serde(default)]
    pub metric: SimilarityMetric,

    /// Result limit for searches.
    #[serde(default)]
    pub limit: Option<i64>,

    /// Expected vector dimension. Unset or 0 skips the check.
    #[serde(default)]
    pub dimension: Option<usize>,

    /// Scale vectors to unit length before writing or searching.
    #[serde(default)]
    pub normalize: bool,

    /// `ivfflat.probes` applied to searches.
    #[serde(default)]
    pub probes: Option<u32>,

    /// `hnsw.ef_search` applied to searches.
    #[serde(default)]
    pub ef_search: Option<u32>,
}

impl Default for OperationDefaults {
    fn default() -> Self {
        Self {
            table: None,
            column: None,
            id_column: default_id_column(),
            metric: SimilarityMetric::default(),
            limit: None,
            dimension: None,
            normalize: false,
            probes: None,
            ef_search: None,
        }
    }
}

impl OperationDefaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_column.trim().is_empty() {
            return Err(ConfigError::Validation(
                "defaults.id_column cannot be empty".into(),
            ));
        }
        if let Some(limit) = self.limit
            && !(0..=MAX_LIMIT).contains(&limit)
        {
            return Err(ConfigError::Validation(format!(
                "defaults.limit must be between 0 and {MAX_LIMIT}, got {limit}"
            )));
        }
        if self.probes == Some(0) {
            return Err(ConfigError::Validation(
                "defaults.probes must be at least 1".into(),
            ));
        }
        if self.ef_search == Some(0) {
            return Err(ConfigError::Validation(
                "defaults.ef_search must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_id_column() -> String {
    "id".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = OperationDefaults::default();
        assert_eq!(defaults.id_column, "id");
        assert_eq!(defaults.metric, SimilarityMetric::Cosine);
        assert!(!defaults.normalize);
        defaults.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(
            OperationDefaults {
                limit: Some(-1),
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            OperationDefaults {
                probes: Some(0),
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            OperationDefaults {
                id_column: " ".into(),
                ..Default::default()
            }
            .validate()
            .is_err()
        );
    }
}
