use serde::{Deserialize, Serialize};

/// Distance metric used to order similarity results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityMetric {
    /// Cosine distance. Best for text embeddings (default).
    #[default]
    Cosine,

    /// Euclidean (L2) distance.
    L2,

    /// Negative inner product. Bounded scores require normalized vectors.
    #[serde(alias = "ip", alias = "inner_product")]
    InnerProduct,
}

impl SimilarityMetric {
    /// Resolve a metric name, falling back to cosine for unknown or absent names.
    pub fn from_name(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return SimilarityMetric::Cosine;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => SimilarityMetric::L2,
            "ip" | "inner-product" | "inner_product" => SimilarityMetric::InnerProduct,
            "cosine" => SimilarityMetric::Cosine,
            other => {
                tracing::debug!(metric = other, "Unknown metric, using cosine");
                SimilarityMetric::Cosine
            }
        }
    }

    /// Returns the pgvector distance operator for queries.
    pub fn pgvector_operator(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "<=>",
            SimilarityMetric::L2 => "<->",
            SimilarityMetric::InnerProduct => "<#>",
        }
    }

    /// Returns the pgvector operator class name for index creation.
    pub fn pgvector_ops_class(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "vector_cosine_ops",
            SimilarityMetric::L2 => "vector_l2_ops",
            SimilarityMetric::InnerProduct => "vector_ip_ops",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::L2 => "l2",
            SimilarityMetric::InnerProduct => "inner-product",
        }
    }
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
