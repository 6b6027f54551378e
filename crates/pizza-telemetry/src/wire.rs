//! Collector wire formats
//!
//! Logs are pushed as Loki streams, metrics as OTLP/HTTP JSON.

use crate::event::LogEvent;
use crate::samples::{MetricBatch, MetricKind, MetricSample, MetricValue, Temporality};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// `{ streams: [ { stream: {...}, values: [[ts, line]] } ] }`
#[derive(Debug, Clone, Serialize)]
pub struct LogPushBody {
    pub streams: Vec<LogStream>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStream {
    pub stream: BTreeMap<String, String>,
    pub values: Vec<[String; 2]>,
}

impl LogPushBody {
    /// One stream holding the event; the payload is JSON-encoded into the line
    pub fn from_event(event: &LogEvent) -> Result<Self> {
        let line = serde_json::to_string(&event.payload)?;
        Ok(Self {
            streams: vec![LogStream {
                stream: event.labels.clone(),
                values: vec![[event.timestamp_nanos.to_string(), line]],
            }],
        })
    }
}

/// `{ resourceMetrics: [ { scopeMetrics: [ { metrics: [...] } ] } ] }`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPushBody {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeMetrics {
    pub metrics: Vec<WireMetric>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireMetric {
    pub name: String,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<WireSum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gauge: Option<WireGauge>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSum {
    pub data_points: Vec<DataPoint>,
    pub aggregation_temporality: &'static str,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGauge {
    pub data_points: Vec<DataPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(flatten)]
    pub value: WireValue,
    pub time_unix_nano: u64,
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WireValue {
    AsInt(i64),
    AsDouble(f64),
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

impl Temporality {
    pub fn as_otlp(&self) -> &'static str {
        match self {
            Temporality::Cumulative => "AGGREGATION_TEMPORALITY_CUMULATIVE",
        }
    }
}

impl From<MetricValue> for WireValue {
    fn from(value: MetricValue) -> Self {
        match value {
            MetricValue::Int(v) => WireValue::AsInt(v),
            MetricValue::Double(v) => WireValue::AsDouble(v),
        }
    }
}

impl From<&MetricSample> for WireMetric {
    fn from(sample: &MetricSample) -> Self {
        let data_points = vec![DataPoint {
            value: sample.value.into(),
            time_unix_nano: sample.timestamp_nanos,
            attributes: sample
                .attributes
                .iter()
                .map(|(key, value)| KeyValue {
                    key: key.clone(),
                    value: AnyValue {
                        string_value: value.clone(),
                    },
                })
                .collect(),
        }];

        let (sum, gauge) = match sample.kind {
            MetricKind::Sum {
                monotonic,
                temporality,
            } => (
                Some(WireSum {
                    data_points,
                    aggregation_temporality: temporality.as_otlp(),
                    is_monotonic: monotonic,
                }),
                None,
            ),
            MetricKind::Gauge => (None, Some(WireGauge { data_points })),
        };

        WireMetric {
            name: sample.name.clone(),
            unit: sample.unit.clone(),
            sum,
            gauge,
        }
    }
}

impl From<&MetricBatch> for MetricPushBody {
    fn from(batch: &MetricBatch) -> Self {
        Self {
            resource_metrics: vec![ResourceMetrics {
                scope_metrics: vec![ScopeMetrics {
                    metrics: batch.samples.iter().map(WireMetric::from).collect(),
                }],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventLevel, EventType};
    use serde_json::json;

    #[test]
    fn test_log_push_body_shape() {
        let event = LogEvent {
            level: EventLevel::Error,
            event_type: EventType::Http,
            timestamp_nanos: 1_700_000_000_000_000_000,
            labels: BTreeMap::from([
                ("component".to_string(), "pizza".to_string()),
                ("level".to_string(), "error".to_string()),
                ("type".to_string(), "http".to_string()),
            ]),
            payload: json!({ "statusCode": 500 }),
        };

        let body = serde_json::to_value(LogPushBody::from_event(&event).unwrap()).unwrap();

        assert_eq!(
            body,
            json!({
                "streams": [{
                    "stream": { "component": "pizza", "level": "error", "type": "http" },
                    "values": [["1700000000000000000", "{\"statusCode\":500}"]]
                }]
            })
        );
    }

    #[test]
    fn test_metric_push_body_shape() {
        let batch = MetricBatch::new(vec![
            MetricSample::sum("http_requests_total", "1", MetricValue::Int(3))
                .with_attribute("method", "ALL")
                .with_attribute("source", "pizza")
                .at(42),
            MetricSample::gauge("cpu_usage_percent", "%", MetricValue::Double(12.5))
                .with_attribute("source", "pizza")
                .at(42),
        ]);

        let body = serde_json::to_value(MetricPushBody::from(&batch)).unwrap();
        let metrics = &body["resourceMetrics"][0]["scopeMetrics"][0]["metrics"];

        assert_eq!(
            metrics[0],
            json!({
                "name": "http_requests_total",
                "unit": "1",
                "sum": {
                    "dataPoints": [{
                        "asInt": 3,
                        "timeUnixNano": 42,
                        "attributes": [
                            { "key": "method", "value": { "stringValue": "ALL" } },
                            { "key": "source", "value": { "stringValue": "pizza" } }
                        ]
                    }],
                    "aggregationTemporality": "AGGREGATION_TEMPORALITY_CUMULATIVE",
                    "isMonotonic": true
                }
            })
        );

        assert!(metrics[1].get("sum").is_none());
        assert_eq!(metrics[1]["gauge"]["dataPoints"][0]["asDouble"], 12.5);
        assert!(metrics[1]["gauge"].get("isMonotonic").is_none());
    }
}
