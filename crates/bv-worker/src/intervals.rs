//! Merging detections into visible intervals and per-product aggregates.

use bv_models::{AnalysisConfig, Detection, ProductAggregate, ReferenceProduct, VisibleInterval};

const EPSILON: f64 = 1e-9;

/// Turns one product's final detections into a `ProductAggregate`.
///
/// Pure: the same detections always yield the same aggregate.
#[derive(Debug, Clone, Copy)]
pub struct IntervalAggregator {
    frame_interval: f64,
    merge_gap: f64,
    duration: f64,
}

impl IntervalAggregator {
    pub fn new(config: &AnalysisConfig, duration_seconds: f64) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            merge_gap: config.merge_gap(),
            duration: duration_seconds.max(0.0),
        }
    }

    /// Merge ascending timestamps into sorted, non-overlapping intervals.
    ///
    /// Each interval covers `[first, last + frame_interval)`, clipped to the
    /// video duration.
    pub fn merge(&self, timestamps: &[f64]) -> Vec<VisibleInterval> {
        let mut intervals: Vec<VisibleInterval> = Vec::new();
        let mut run: Option<(f64, f64)> = None;

        for &t in timestamps {
            run = match run {
                Some((first, last)) if t - last <= self.merge_gap + EPSILON => Some((first, t)),
                Some((first, last)) => {
                    self.push_interval(&mut intervals, first, last);
                    Some((t, t))
                }
                None => Some((t, t)),
            };
        }
        if let Some((first, last)) = run {
            self.push_interval(&mut intervals, first, last);
        }

        intervals
    }

    fn push_interval(&self, intervals: &mut Vec<VisibleInterval>, first: f64, last: f64) {
        let start = first.max(0.0);
        let end = (last + self.frame_interval).min(self.duration);
        if end <= start {
            return;
        }
        // A clipped end can touch the next start; keep them disjoint
        match intervals.last_mut() {
            Some(prev) if start <= prev.end => prev.end = prev.end.max(end),
            _ => intervals.push(VisibleInterval::new(start, end)),
        }
    }

    pub fn aggregate(&self, product: &ReferenceProduct, detections: &[Detection]) -> ProductAggregate {
        let timestamps: Vec<f64> = detections.iter().map(|d| d.timestamp_seconds).collect();
        let visible_intervals = self.merge(&timestamps);
        let total_visible_seconds = visible_intervals.iter().map(VisibleInterval::length).sum();

        let confidence = if detections.is_empty() {
            0
        } else {
            let mean = detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64;
            mean.round().clamp(0.0, 100.0) as u8
        };

        ProductAggregate {
            product_id: product.id.clone(),
            name: product.name.clone(),
            detection_count: detections.len() as u32,
            timestamps,
            visible_intervals,
            total_visible_seconds,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> ReferenceProduct {
        ReferenceProduct::new("a", "Can", "/refs/a.png", 80)
    }

    fn detections(ts: &[f64], confidence: f64) -> Vec<Detection> {
        ts.iter()
            .map(|t| Detection {
                product_id: "a".into(),
                timestamp_seconds: *t,
                confidence,
            })
            .collect()
    }

    #[test]
    fn test_consecutive_samples_merge() {
        let aggregator = IntervalAggregator::new(&AnalysisConfig::with_frame_rate(1.0), 60.0);
        let intervals = aggregator.merge(&[0.0, 1.0, 2.0, 10.0]);

        assert_eq!(
            intervals,
            vec![VisibleInterval::new(0.0, 3.0), VisibleInterval::new(10.0, 11.0)]
        );
    }

    #[test]
    fn test_gap_of_two_frames_still_merges() {
        // Dedup leaves kept samples two frames apart during continuous presence
        let aggregator = IntervalAggregator::new(&AnalysisConfig::with_frame_rate(2.0), 60.0);
        let intervals = aggregator.merge(&[0.0, 1.0, 2.0]);

        assert_eq!(intervals, vec![VisibleInterval::new(0.0, 2.5)]);
    }

    #[test]
    fn test_end_clipped_to_duration() {
        let aggregator = IntervalAggregator::new(&AnalysisConfig::with_frame_rate(1.0), 9.5);
        let intervals = aggregator.merge(&[8.0, 9.0]);

        assert_eq!(intervals, vec![VisibleInterval::new(8.0, 9.5)]);
    }

    #[test]
    fn test_aggregate_totals_and_confidence() {
        let aggregator = IntervalAggregator::new(&AnalysisConfig::with_frame_rate(1.0), 60.0);
        let mut dets = detections(&[0.0, 1.0, 2.0, 10.0], 90.0);
        dets[3].confidence = 81.0;

        let aggregate = aggregator.aggregate(&product(), &dets);
        assert_eq!(aggregate.detection_count, 4);
        assert!((aggregate.total_visible_seconds - 4.0).abs() < 1e-9);
        // mean 87.75 rounds to 88
        assert_eq!(aggregate.confidence, 88);
        assert_eq!(aggregate.name, "Can");
    }

    #[test]
    fn test_empty_detections() {
        let aggregator = IntervalAggregator::new(&AnalysisConfig::default(), 60.0);
        let aggregate = aggregator.aggregate(&product(), &[]);

        assert_eq!(aggregate.detection_count, 0);
        assert_eq!(aggregate.confidence, 0);
        assert!(aggregate.visible_intervals.is_empty());
        assert_eq!(aggregate.total_visible_seconds, 0.0);
    }

    #[test]
    fn test_idempotent() {
        let aggregator = IntervalAggregator::new(&AnalysisConfig::with_frame_rate(2.0), 30.0);
        let dets = detections(&[0.0, 1.0, 4.0, 4.5, 20.0], 93.0);

        assert_eq!(
            aggregator.aggregate(&product(), &dets),
            aggregator.aggregate(&product(), &dets)
        );
    }

    #[test]
    fn test_intervals_sorted_disjoint_and_bounded() {
        let aggregator = IntervalAggregator::new(&AnalysisConfig::with_frame_rate(1.0), 12.0);
        let intervals = aggregator.merge(&[0.0, 3.0, 4.0, 8.0, 11.0]);

        for pair in intervals.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        let total: f64 = intervals.iter().map(VisibleInterval::length).sum();
        assert!(total <= 12.0);
    }
}
