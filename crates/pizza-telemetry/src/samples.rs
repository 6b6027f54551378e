//! Metric samples produced by a flush cycle

use std::collections::BTreeMap;

/// Aggregation temporality of a sum metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporality {
    Cumulative,
}

/// Sum or gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Sum {
        monotonic: bool,
        temporality: Temporality,
    },
    Gauge,
}

/// Integer or floating point value of a data point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Double(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Int(value) => *value as f64,
            MetricValue::Double(value) => *value,
        }
    }
}

/// One data point of one metric, built fresh on every flush
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub unit: String,
    pub kind: MetricKind,
    pub value: MetricValue,
    pub attributes: BTreeMap<String, String>,
    pub timestamp_nanos: u64,
}

impl MetricSample {
    /// Cumulative, monotonic sum
    pub fn sum(name: &str, unit: &str, value: MetricValue) -> Self {
        Self::new(
            name,
            unit,
            MetricKind::Sum {
                monotonic: true,
                temporality: Temporality::Cumulative,
            },
            value,
        )
    }

    /// Instantaneous gauge
    pub fn gauge(name: &str, unit: &str, value: MetricValue) -> Self {
        Self::new(name, unit, MetricKind::Gauge, value)
    }

    fn new(name: &str, unit: &str, kind: MetricKind, value: MetricValue) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            kind,
            value,
            attributes: BTreeMap::new(),
            timestamp_nanos: 0,
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn at(mut self, timestamp_nanos: u64) -> Self {
        self.timestamp_nanos = timestamp_nanos;
        self
    }

    pub fn is_sum(&self) -> bool {
        matches!(self.kind, MetricKind::Sum { .. })
    }
}

/// Every sample built by one flush cycle, shipped in a single push
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBatch {
    pub samples: Vec<MetricSample>,
}

impl MetricBatch {
    pub fn new(samples: Vec<MetricSample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// First sample named `name` whose attributes include every `(key, value)` pair
    pub fn find(&self, name: &str, attributes: &[(&str, &str)]) -> Option<&MetricSample> {
        self.samples.iter().find(|sample| {
            sample.name == name
                && attributes.iter().all(|(key, value)| {
                    sample.attributes.get(*key).map(String::as_str) == Some(*value)
                })
        })
    }

    /// Numeric value of the matching sample
    pub fn value(&self, name: &str, attributes: &[(&str, &str)]) -> Option<f64> {
        self.find(name, attributes).map(|sample| sample.value.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_defaults_to_monotonic_cumulative() {
        let sample = MetricSample::sum("pizza_sold_total", "1", MetricValue::Int(3));
        assert!(sample.is_sum());
        assert_eq!(
            sample.kind,
            MetricKind::Sum {
                monotonic: true,
                temporality: Temporality::Cumulative
            }
        );
    }

    #[test]
    fn test_batch_lookup_by_attributes() {
        let batch = MetricBatch::new(vec![
            MetricSample::sum("http_requests_total", "1", MetricValue::Int(2))
                .with_attribute("method", "GET"),
            MetricSample::sum("http_requests_total", "1", MetricValue::Int(1))
                .with_attribute("method", "POST"),
            MetricSample::gauge("cpu_usage_percent", "%", MetricValue::Double(12.5)),
        ]);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.value("http_requests_total", &[("method", "POST")]), Some(1.0));
        assert_eq!(batch.value("cpu_usage_percent", &[]), Some(12.5));
        assert!(batch.find("http_requests_total", &[("method", "PUT")]).is_none());
    }
}
