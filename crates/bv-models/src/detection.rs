//! Frame-level detection models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::product::ProductId;

/// A single frame-level match of a reference product above its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawDetection {
    pub product_id: ProductId,
    /// Timestamp of the sampled frame in seconds
    pub timestamp_seconds: f64,
    /// Match confidence (0-100)
    pub confidence: f64,
}

impl RawDetection {
    pub fn new(product_id: impl Into<ProductId>, timestamp_seconds: f64, confidence: f64) -> Self {
        Self {
            product_id: product_id.into(),
            timestamp_seconds,
            confidence: confidence.clamp(0.0, 100.0),
        }
    }
}

/// A raw detection that survived temporal deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub product_id: ProductId,
    pub timestamp_seconds: f64,
    pub confidence: f64,
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        Self {
            product_id: raw.product_id,
            timestamp_seconds: raw.timestamp_seconds,
            confidence: raw.confidence,
        }
    }
}
