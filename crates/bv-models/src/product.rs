//! Reference product models.

use std::collections::HashSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::ConfigError;

/// Identifier of a reference product, unique within a product set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A user-supplied product the pipeline searches for.
///
/// Frozen for the lifetime of a job once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceProduct {
    /// Product identifier
    pub id: ProductId,

    /// Display name used in reports
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    /// Reference image (URL, storage key or data URI)
    #[validate(length(min = 1))]
    pub image_ref: String,

    /// Minimum match confidence (0-100) for a detection to count
    #[validate(range(max = 100))]
    pub min_confidence: u8,

    /// Only active products participate in detection
    #[serde(default = "default_active", alias = "isActive")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ReferenceProduct {
    /// Create an active product.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        image_ref: impl Into<String>,
        min_confidence: u8,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image_ref: image_ref.into(),
            min_confidence,
            active: true,
        }
    }

    /// Mark this product inactive.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Products from the set that take part in detection, in submission order.
pub fn active_products(products: &[ReferenceProduct]) -> Vec<ReferenceProduct> {
    products.iter().filter(|p| p.active).cloned().collect()
}

/// Validate a full product set before a job is created.
///
/// Checks every product's fields, id uniqueness across the whole set
/// (inactive products included) and that at least one product is active.
pub fn validate_product_set(products: &[ReferenceProduct]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for product in products {
        if product.id.as_str().trim().is_empty() {
            return Err(ConfigError::InvalidProduct("product id must not be empty".into()));
        }
        product
            .validate()
            .map_err(|e| ConfigError::InvalidProduct(format!("{}: {}", product.id, e)))?;
        if !seen.insert(product.id.clone()) {
            return Err(ConfigError::DuplicateProductId(product.id.to_string()));
        }
    }

    if !products.iter().any(|p| p.active) {
        return Err(ConfigError::EmptyProductSet);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str) -> ReferenceProduct {
        ReferenceProduct::new(id, format!("Product {}", id), "/refs/a.png", 85)
    }

    #[test]
    fn test_active_filter_keeps_order() {
        let products = vec![product("a"), product("b").inactive(), product("c")];
        let active = active_products(&products);

        let ids: Vec<&str> = active.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_empty_active_set_rejected() {
        let products = vec![product("a").inactive()];
        assert!(matches!(
            validate_product_set(&products),
            Err(ConfigError::EmptyProductSet)
        ));
        assert!(matches!(validate_product_set(&[]), Err(ConfigError::EmptyProductSet)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let products = vec![product("a"), product("a").inactive()];
        assert!(matches!(
            validate_product_set(&products),
            Err(ConfigError::DuplicateProductId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let mut bad = product("a");
        bad.min_confidence = 101;
        assert!(matches!(
            validate_product_set(&[bad]),
            Err(ConfigError::InvalidProduct(_))
        ));
    }

    #[test]
    fn test_deserialize_accepts_ui_field_names() {
        let json = r#"{"id":"1","name":"Producto A","imageRef":"/placeholder.svg","minConfidence":85,"isActive":false}"#;
        let parsed: ReferenceProduct = serde_json::from_str(json).unwrap();
        assert!(!parsed.active);
        assert_eq!(parsed.min_confidence, 85);

        let json = r#"{"id":"2","name":"Producto B","imageRef":"/placeholder.svg","minConfidence":90}"#;
        let parsed: ReferenceProduct = serde_json::from_str(json).unwrap();
        assert!(parsed.active);
    }
}
