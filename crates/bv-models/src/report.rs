//! Per-product aggregates and the final analysis report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::product::ProductId;
use crate::timestamp::format_clock;

/// Half-open span `[start, end)` of seconds during which a product is visible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisibleInterval {
    pub start: f64,
    pub end: f64,
}

impl VisibleInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Length of the union of a set of intervals, in any order.
pub fn union_length(intervals: &[VisibleInterval]) -> f64 {
    let mut sorted: Vec<VisibleInterval> = intervals
        .iter()
        .copied()
        .filter(|i| i.end > i.start)
        .collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut total = 0.0;
    let mut current: Option<VisibleInterval> = None;
    for interval in sorted {
        match current.as_mut() {
            Some(cur) if interval.start <= cur.end => {
                cur.end = cur.end.max(interval.end);
            }
            _ => {
                if let Some(done) = current.take() {
                    total += done.length();
                }
                current = Some(interval);
            }
        }
    }
    if let Some(done) = current {
        total += done.length();
    }
    total
}

/// Confidence tier shown next to a product's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => ConfidenceTier::High,
            80..=89 => ConfidenceTier::Medium,
            _ => ConfidenceTier::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}

/// Everything the pipeline learned about one active product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductAggregate {
    pub product_id: ProductId,
    pub name: String,
    pub detection_count: u32,
    /// Strictly ascending detection timestamps in seconds
    pub timestamps: Vec<f64>,
    /// Sorted, non-overlapping visible intervals
    pub visible_intervals: Vec<VisibleInterval>,
    pub total_visible_seconds: f64,
    /// Mean detection confidence, rounded (0-100)
    pub confidence: u8,
}

impl ProductAggregate {
    /// Aggregate for a product that was never detected.
    pub fn empty(product_id: ProductId, name: impl Into<String>) -> Self {
        Self {
            product_id,
            name: name.into(),
            detection_count: 0,
            timestamps: Vec::new(),
            visible_intervals: Vec::new(),
            total_visible_seconds: 0.0,
            confidence: 0,
        }
    }

    pub fn first_appearance(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn confidence_tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_score(self.confidence)
    }
}

/// Final report of an analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub video_title: String,
    pub duration_seconds: f64,
    pub total_detections: u32,
    pub unique_product_count: u32,
    /// Time during which at least one product is visible
    pub total_visible_seconds: f64,
    /// Set when too many frames were dropped for the result to be complete
    #[serde(default)]
    pub partial_data: bool,
    #[serde(default)]
    pub frames_sampled: u64,
    #[serde(default)]
    pub frames_dropped: u64,
    pub products: Vec<ProductAggregate>,
}

impl AnalysisResult {
    /// Share of the video during which any product is visible (0-100).
    pub fn coverage_percent(&self) -> u8 {
        if self.duration_seconds <= 0.0 {
            return 0;
        }
        (self.total_visible_seconds / self.duration_seconds * 100.0)
            .round()
            .clamp(0.0, 100.0) as u8
    }

    /// Share of all detections that belong to `product` (0-100).
    pub fn share_percent(&self, product: &ProductAggregate) -> u8 {
        if self.total_detections == 0 {
            return 0;
        }
        (product.detection_count as f64 / self.total_detections as f64 * 100.0)
            .round()
            .clamp(0.0, 100.0) as u8
    }

    /// Earliest detection of any product.
    pub fn first_appearance(&self) -> Option<f64> {
        self.products
            .iter()
            .filter_map(ProductAggregate::first_appearance)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn product(&self, id: &ProductId) -> Option<&ProductAggregate> {
        self.products.iter().find(|p| &p.product_id == id)
    }

    /// Comma-separated export of the product table, header first.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "product_id,name,detections,visible_time,share_percent,confidence,confidence_tier,first_appearance\n",
        );
        for product in &self.products {
            let first = product
                .first_appearance()
                .map(format_clock)
                .unwrap_or_default();
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                csv_field(product.product_id.as_str()),
                csv_field(&product.name),
                product.detection_count,
                format_clock(product.total_visible_seconds),
                self.share_percent(product),
                product.confidence,
                product.confidence_tier().as_str(),
                first,
            ));
        }
        out
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(id: &str, count: u32, timestamps: Vec<f64>, confidence: u8) -> ProductAggregate {
        ProductAggregate {
            product_id: ProductId::from(id),
            name: format!("Product {}", id),
            detection_count: count,
            timestamps,
            visible_intervals: Vec::new(),
            total_visible_seconds: count as f64,
            confidence,
        }
    }

    fn result(products: Vec<ProductAggregate>) -> AnalysisResult {
        AnalysisResult {
            video_title: "Promo".into(),
            duration_seconds: 40.0,
            total_detections: products.iter().map(|p| p.detection_count).sum(),
            unique_product_count: products.iter().filter(|p| p.detection_count > 0).count() as u32,
            total_visible_seconds: 10.0,
            partial_data: false,
            frames_sampled: 40,
            frames_dropped: 0,
            products,
        }
    }

    #[test]
    fn test_union_length_overlapping() {
        let intervals = vec![
            VisibleInterval::new(5.0, 8.0),
            VisibleInterval::new(0.0, 3.0),
            VisibleInterval::new(2.0, 4.0),
        ];
        assert!((union_length(&intervals) - 7.0).abs() < 1e-9);
        assert_eq!(union_length(&[]), 0.0);
    }

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(ConfidenceTier::from_score(100), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(90), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(89), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(80), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(79), ConfidenceTier::Low);
    }

    #[test]
    fn test_percentages() {
        let report = result(vec![
            aggregate("a", 3, vec![1.0, 4.0, 9.0], 92),
            aggregate("b", 1, vec![2.0], 81),
        ]);
        assert_eq!(report.coverage_percent(), 25);
        assert_eq!(report.share_percent(&report.products[0]), 75);
        assert_eq!(report.share_percent(&report.products[1]), 25);
        assert_eq!(report.first_appearance(), Some(1.0));
    }

    #[test]
    fn test_percentages_with_no_data() {
        let mut report = result(vec![aggregate("a", 0, vec![], 0)]);
        report.duration_seconds = 0.0;
        assert_eq!(report.coverage_percent(), 0);
        assert_eq!(report.share_percent(&report.products[0]), 0);
        assert_eq!(report.first_appearance(), None);
    }

    #[test]
    fn test_csv_export() {
        let mut b = aggregate("b", 1, vec![65.0], 81);
        b.name = "Soda, \"Zero\"".into();
        let report = result(vec![aggregate("a", 3, vec![1.0, 4.0, 9.0], 92), b]);

        let csv = report.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("product_id,name,detections"));
        assert_eq!(lines[1], "a,Product a,3,0:03,75,92,high,0:01");
        assert_eq!(lines[2], "b,\"Soda, \"\"Zero\"\"\",1,0:01,25,81,medium,1:05");
    }

    #[test]
    fn test_serialized_shape() {
        let report = result(vec![aggregate("a", 1, vec![2.0], 90)]);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["videoTitle"], "Promo");
        assert_eq!(json["uniqueProductCount"], 1);
        assert_eq!(json["partialData"], false);
        let product = &json["products"][0];
        assert_eq!(product["detectionCount"], 1);
        assert_eq!(product["totalVisibleSeconds"], 1.0);
        assert_eq!(product["timestamps"][0], 2.0);
    }
}
