//! Assembly of the final analysis report.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bv_models::{
    union_length, AnalysisResult, ConfigError, ProductAggregate, ProductId, ReferenceProduct,
    VideoMetadata, VisibleInterval,
};

use crate::error::WorkerResult;

/// How much of the sampled video actually went through detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCoverage {
    /// Frames counted against the failure budget
    pub attempted: u64,
    pub dropped: u64,
    /// Result is known to be incomplete
    pub partial: bool,
}

impl FrameCoverage {
    pub fn processed(&self) -> u64 {
        self.attempted.saturating_sub(self.dropped)
    }

    pub fn drop_ratio(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.dropped as f64 / self.attempted as f64
    }
}

pub struct ReportBuilder;

impl ReportBuilder {
    /// Build the report for the active products.
    ///
    /// Products without an aggregate are reported with zero detections.
    pub fn build(
        metadata: &VideoMetadata,
        active_products: &[ReferenceProduct],
        mut aggregates: BTreeMap<ProductId, ProductAggregate>,
        coverage: FrameCoverage,
    ) -> WorkerResult<AnalysisResult> {
        if active_products.is_empty() {
            return Err(ConfigError::EmptyProductSet.into());
        }

        let mut products: Vec<ProductAggregate> = active_products
            .iter()
            .map(|product| {
                aggregates
                    .remove(&product.id)
                    .unwrap_or_else(|| ProductAggregate::empty(product.id.clone(), product.name.clone()))
            })
            .collect();

        products.sort_by(compare_products);

        let total_detections = products.iter().map(|p| p.detection_count).sum();
        let unique_product_count = products.iter().filter(|p| p.detection_count > 0).count() as u32;

        let all_intervals: Vec<VisibleInterval> = products
            .iter()
            .flat_map(|p| p.visible_intervals.iter().copied())
            .collect();
        let total_visible_seconds =
            union_length(&all_intervals).min(metadata.duration_seconds.max(0.0));

        Ok(AnalysisResult {
            video_title: metadata.title.clone(),
            duration_seconds: metadata.duration_seconds,
            total_detections,
            unique_product_count,
            total_visible_seconds,
            partial_data: coverage.partial,
            frames_sampled: coverage.attempted,
            frames_dropped: coverage.dropped,
            products,
        })
    }
}

/// Most detected first, then earliest appearance, then id.
fn compare_products(a: &ProductAggregate, b: &ProductAggregate) -> Ordering {
    b.detection_count
        .cmp(&a.detection_count)
        .then_with(|| match (a.first_appearance(), b.first_appearance()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.product_id.cmp(&b.product_id))
}
