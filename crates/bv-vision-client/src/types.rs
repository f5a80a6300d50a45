//! Vision service request/response types.

use bv_models::{ProductId, ReferenceProduct};
use serde::{Deserialize, Serialize};

/// Reference product as sent to the vision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: ProductId,
    pub image_ref: String,
}

impl From<&ReferenceProduct> for ProductRef {
    fn from(product: &ReferenceProduct) -> Self {
        Self {
            id: product.id.clone(),
            image_ref: product.image_ref.clone(),
        }
    }
}

/// Request to match one frame against a set of reference products.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub timestamp_seconds: f64,
    /// JPEG-encoded frame, standard base64
    pub frame_jpeg_base64: String,
    pub products: Vec<ProductRef>,
}

/// Similarity of one reference product to the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMatch {
    pub product_id: ProductId,
    /// Match score (0-100)
    pub score: f64,
}

impl ProductMatch {
    pub fn new(product_id: impl Into<ProductId>, score: f64) -> Self {
        Self {
            product_id: product_id.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    #[serde(default)]
    pub matches: Vec<ProductMatch>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
