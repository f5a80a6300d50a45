//! Temporal deduplication of raw detections.
//!
//! Detections arrive in completion order, not timestamp order, so they are
//! buffered per product and only filtered once the detection stage is done.

use std::collections::BTreeMap;

use bv_models::{AnalysisConfig, Detection, ProductId, RawDetection};

/// Slack for comparing float timestamps against the window.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct TemporalDeduplicator {
    window: f64,
    skip_similar: bool,
    buffers: BTreeMap<ProductId, Vec<RawDetection>>,
}

impl TemporalDeduplicator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self::with_window(config.dedup_window(), config.skip_similar)
    }

    pub fn with_window(window: f64, skip_similar: bool) -> Self {
        Self {
            window,
            skip_similar,
            buffers: BTreeMap::new(),
        }
    }

    /// Buffer one raw detection.
    pub fn push(&mut self, detection: RawDetection) {
        self.buffers
            .entry(detection.product_id.clone())
            .or_default()
            .push(detection);
    }

    pub fn extend(&mut self, detections: impl IntoIterator<Item = RawDetection>) {
        for detection in detections {
            self.push(detection);
        }
    }

    /// Number of buffered raw detections.
    pub fn buffered(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }

    /// Filter each product's detections, returned in timestamp order.
    ///
    /// Same-timestamp duplicates always collapse to the most confident one.
    /// With `skip_similar`, a detection within the window of the previous
    /// kept detection of the same product is dropped.
    pub fn finish(self) -> BTreeMap<ProductId, Vec<Detection>> {
        let window = self.window;
        let skip_similar = self.skip_similar;

        self.buffers
            .into_iter()
            .map(|(product_id, mut raw)| {
                // Highest confidence first among equal timestamps
                raw.sort_by(|a, b| {
                    a.timestamp_seconds
                        .total_cmp(&b.timestamp_seconds)
                        .then(b.confidence.total_cmp(&a.confidence))
                });

                let mut kept: Vec<Detection> = Vec::with_capacity(raw.len());
                for detection in raw {
                    if let Some(last) = kept.last() {
                        let gap = detection.timestamp_seconds - last.timestamp_seconds;
                        if gap.abs() <= EPSILON {
                            continue;
                        }
                        if skip_similar && gap <= window + EPSILON {
                            continue;
                        }
                    }
                    kept.push(detection.into());
                }

                (product_id, kept)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, t: f64, confidence: f64) -> RawDetection {
        RawDetection::new(id, t, confidence)
    }

    fn timestamps(out: &BTreeMap<ProductId, Vec<Detection>>, id: &str) -> Vec<f64> {
        out.get(&ProductId::from(id))
            .map(|d| d.iter().map(|d| d.timestamp_seconds).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_adjacent_samples_collapse_at_rate_two() {
        let mut dedup = TemporalDeduplicator::new(&AnalysisConfig::with_frame_rate(2.0));
        dedup.push(raw("a", 0.0, 90.0));
        dedup.push(raw("a", 0.5, 92.0));

        let out = dedup.finish();
        assert_eq!(timestamps(&out, "a"), vec![0.0]);
    }

    #[test]
    fn test_distant_samples_both_kept() {
        let mut dedup = TemporalDeduplicator::new(&AnalysisConfig::with_frame_rate(2.0));
        dedup.push(raw("a", 5.0, 90.0));
        dedup.push(raw("a", 0.0, 90.0));

        let out = dedup.finish();
        assert_eq!(timestamps(&out, "a"), vec![0.0, 5.0]);
    }

    #[test]
    fn test_window_measured_from_last_kept() {
        // 0.0 kept, 0.5 dropped, 1.0 kept (1.0 from last kept), 1.5 dropped
        let mut dedup = TemporalDeduplicator::new(&AnalysisConfig::with_frame_rate(2.0));
        dedup.extend([1.5, 0.5, 1.0, 0.0].map(|t| raw("a", t, 90.0)));

        let out = dedup.finish();
        assert_eq!(timestamps(&out, "a"), vec![0.0, 1.0]);
    }

    #[test]
    fn test_products_are_independent() {
        let mut dedup = TemporalDeduplicator::new(&AnalysisConfig::with_frame_rate(1.0));
        dedup.push(raw("a", 0.0, 90.0));
        dedup.push(raw("b", 0.0, 90.0));
        dedup.push(raw("b", 1.0, 90.0));

        let out = dedup.finish();
        assert_eq!(timestamps(&out, "a"), vec![0.0]);
        assert_eq!(timestamps(&out, "b"), vec![0.0]);
    }

    #[test]
    fn test_skip_similar_disabled_keeps_all_but_exact_duplicates() {
        let mut config = AnalysisConfig::with_frame_rate(2.0);
        config.skip_similar = false;
        let mut dedup = TemporalDeduplicator::new(&config);
        dedup.extend([raw("a", 0.5, 80.0), raw("a", 0.0, 90.0), raw("a", 0.5, 95.0)]);

        let out = dedup.finish();
        let kept = &out[&ProductId::from("a")];
        assert_eq!(timestamps(&out, "a"), vec![0.0, 0.5]);
        assert_eq!(kept[1].confidence, 95.0);
    }

    #[test]
    fn test_order_independent() {
        let inputs = [0.0, 3.0, 0.5, 2.0, 7.5, 1.0, 2.5];

        let mut forward = TemporalDeduplicator::new(&AnalysisConfig::with_frame_rate(2.0));
        forward.extend(inputs.iter().map(|t| raw("a", *t, 90.0)));

        let mut reverse = TemporalDeduplicator::new(&AnalysisConfig::with_frame_rate(2.0));
        reverse.extend(inputs.iter().rev().map(|t| raw("a", *t, 90.0)));

        assert_eq!(forward.finish(), reverse.finish());
    }
}
