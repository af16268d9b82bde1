// Histograms for field statistics
//
// Two flavours are provided: a categorical histogram counting distinct
// stringified values, and a numeric histogram with percentile-derived bucket
// widths and spill-over buckets on both edges.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Frequency of a single distinct value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueFrequency {
    /// The stringified value
    pub value: String,
    /// Number of occurrences
    pub frequency: usize,
}

/// Categorical histogram sorted by descending frequency
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueHistogram {
    /// Distinct values, most frequent first
    pub values: Vec<ValueFrequency>,
    /// Distinct count divided by total count, in [0, 1]
    pub cardinality: f64,
}

impl ValueHistogram {
    /// Computes a histogram over the given values
    pub fn compute<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut total = 0usize;
        for value in values {
            *counts.entry(value.as_ref().to_string()).or_default() += 1;
            total += 1;
        }

        let mut frequencies: Vec<ValueFrequency> = counts
            .into_iter()
            .map(|(value, frequency)| ValueFrequency { value, frequency })
            .collect();
        // Ties are ordered by value so the result does not depend on hash order
        frequencies.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.value.cmp(&b.value)));

        let cardinality = if total == 0 {
            0.0
        } else {
            frequencies.len() as f64 / total as f64
        };

        Self {
            values: frequencies,
            cardinality,
        }
    }

    /// Total number of values counted
    pub fn total(&self) -> usize {
        self.values.iter().map(|v| v.frequency).sum()
    }

    /// Returns the distinct values in histogram order
    pub fn distinct_values(&self) -> Vec<String> {
        self.values.iter().map(|v| v.value.clone()).collect()
    }
}

/// A single numeric bucket covering `[lower, upper)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub frequency: usize,
}

/// Numeric histogram
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumberHistogram {
    pub buckets: Vec<HistogramBucket>,
}

impl NumberHistogram {
    /// Computes a histogram over the given values.
    ///
    /// The core of the histogram has `desired_buckets` buckets whose width is
    /// chosen so that the 10th to 80th percentile range spans 80% of them.
    /// One extra bucket on each side absorbs every value outside the core, so
    /// the bucket frequencies always sum to the number of values.
    ///
    /// If every value is identical, three buckets of width 1 are produced,
    /// centred on that value.
    pub fn compute(values: &[f64], desired_buckets: usize) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let desired_buckets = desired_buckets.max(1);
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];

        if min == max {
            return Self {
                buckets: vec![
                    HistogramBucket { lower: min - 1.5, upper: min - 0.5, frequency: 0 },
                    HistogramBucket { lower: min - 0.5, upper: min + 0.5, frequency: sorted.len() },
                    HistogramBucket { lower: min + 0.5, upper: min + 1.5, frequency: 0 },
                ],
            };
        }

        let p10 = percentile(&sorted, 0.10);
        let p80 = percentile(&sorted, 0.80);
        let mut width = (p80 - p10) / (desired_buckets as f64 * 0.8);
        if width <= 0.0 || !width.is_finite() {
            // Heavily tied data collapses the percentile range
            width = (max - min) / desired_buckets as f64;
        }

        let core_lower = p10 - width * desired_buckets as f64 * 0.1;
        let core_upper = core_lower + width * desired_buckets as f64;

        let mut buckets = Vec::with_capacity(desired_buckets + 2);
        buckets.push(HistogramBucket {
            lower: min.min(core_lower - width),
            upper: core_lower,
            frequency: 0,
        });
        for index in 0..desired_buckets {
            buckets.push(HistogramBucket {
                lower: core_lower + index as f64 * width,
                upper: core_lower + (index + 1) as f64 * width,
                frequency: 0,
            });
        }
        buckets.push(HistogramBucket {
            lower: core_upper,
            upper: max.max(core_upper + width),
            frequency: 0,
        });

        for &value in &sorted {
            let index = if value < core_lower {
                0
            } else if value >= core_upper {
                desired_buckets + 1
            } else {
                let offset = ((value - core_lower) / width).floor() as usize;
                1 + offset.min(desired_buckets - 1)
            };
            buckets[index].frequency += 1;
        }

        Self { buckets }
    }

    /// Total number of values counted
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.frequency).sum()
    }
}

/// Linearly interpolated percentile over sorted data
fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let position = fraction * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_histogram_ordering() {
        let histogram = ValueHistogram::compute(["b", "a", "b", "c", "b", "a"]);

        assert_eq!(histogram.values[0], ValueFrequency { value: "b".to_string(), frequency: 3 });
        assert_eq!(histogram.values[1].value, "a");
        assert_eq!(histogram.values[2].value, "c");
        assert_eq!(histogram.total(), 6);
        assert!((histogram.cardinality - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_value_histogram_empty() {
        let histogram = ValueHistogram::compute(Vec::<String>::new());
        assert!(histogram.values.is_empty());
        assert_eq!(histogram.cardinality, 0.0);
    }

    #[test]
    fn test_number_histogram_sums_to_count() {
        // Include far outliers on both sides
        let mut values: Vec<f64> = (0..500).map(|i| (i % 97) as f64 * 1.5).collect();
        values.push(-10_000.0);
        values.push(10_000.0);

        let histogram = NumberHistogram::compute(&values, 20);
        assert_eq!(histogram.buckets.len(), 22);
        assert_eq!(histogram.total(), values.len());

        // The outliers land in the spill-over buckets
        assert!(histogram.buckets[0].frequency >= 1);
        assert!(histogram.buckets[21].frequency >= 1);
        assert!(histogram.buckets[0].lower <= -10_000.0);
        assert!(histogram.buckets[21].upper >= 10_000.0);
    }

    #[test]
    fn test_number_histogram_single_value() {
        let histogram = NumberHistogram::compute(&[7.0, 7.0, 7.0], 20);

        assert_eq!(histogram.buckets.len(), 3);
        assert_eq!(histogram.buckets[1].frequency, 3);
        assert_eq!(histogram.buckets[1].lower, 6.5);
        assert_eq!(histogram.buckets[1].upper, 7.5);
        assert_eq!(histogram.total(), 3);
    }

    #[test]
    fn test_number_histogram_heavy_ties() {
        // 90% of the data is the same value, so P10 == P80
        let mut values = vec![1.0; 90];
        values.extend((0..10).map(|i| i as f64 + 2.0));

        let histogram = NumberHistogram::compute(&values, 10);
        assert_eq!(histogram.total(), 100);
        for bucket in &histogram.buckets {
            assert!(bucket.upper > bucket.lower);
        }
    }

    #[test]
    fn test_number_histogram_empty() {
        let histogram = NumberHistogram::compute(&[], 20);
        assert!(histogram.buckets.is_empty());
    }
}
