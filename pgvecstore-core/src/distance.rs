//! Distance metrics and their pgvector spellings.
//!
//! Each metric maps to a native distance operator and an operator class. The
//! store reports similarity as `1 - distance` for every metric.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Supported distance metrics for vector similarity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine distance (`<=>`). Lower is more similar.
    #[default]
    Cosine,
    /// Euclidean distance (`<->`). Lower is more similar.
    Euclidean,
    /// Negative inner product (`<#>`). Lower is more similar.
    #[serde(alias = "dot", alias = "dot_product")]
    DotProduct,
}

impl DistanceMetric {
    /// The pgvector distance operator.
    #[inline]
    pub fn operator(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "<=>",
            DistanceMetric::Euclidean => "<->",
            DistanceMetric::DotProduct => "<#>",
        }
    }

    /// The operator class used when building an ANN index.
    #[inline]
    pub fn ops_class(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "vector_cosine_ops",
            DistanceMetric::Euclidean => "vector_l2_ops",
            DistanceMetric::DotProduct => "vector_ip_ops",
        }
    }

    /// Recovers the metric from an operator class name.
    pub fn from_ops_class(name: &str) -> Option<Self> {
        match name {
            "vector_cosine_ops" => Some(DistanceMetric::Cosine),
            "vector_l2_ops" => Some(DistanceMetric::Euclidean),
            "vector_ip_ops" => Some(DistanceMetric::DotProduct),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dotproduct",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "dotproduct" | "dot_product" | "dot" | "ip" => Ok(DistanceMetric::DotProduct),
            other => Err(Error::InvalidArgument(format!("unknown metric {other:?}"))),
        }
    }
}
