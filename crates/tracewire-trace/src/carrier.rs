//! Cross-process trace context propagation.
//!
//! A [`Carrier`] is exposed to transports as a fixed, ordered sequence of
//! header items (`sw8`, `sw8-correlation`, `sw8-x`). Each item decodes
//! independently and every field inside it is optional: anything missing
//! or malformed is simply absent, which the receiver reads as "no parent".

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracewire_core::config::CorrelationConfig;
use tracewire_core::{SegmentId, SpanId, TraceId};

/// Header items in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKey {
    /// Trace id, parent coordinates and sampling flag.
    Sw8,
    /// User correlation key/value pairs.
    Correlation,
    /// Agent extension flags.
    Extension,
}

impl HeaderKey {
    pub const ORDER: [HeaderKey; 3] = [HeaderKey::Sw8, HeaderKey::Correlation, HeaderKey::Extension];

    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderKey::Sw8 => "sw8",
            HeaderKey::Correlation => "sw8-correlation",
            HeaderKey::Extension => "sw8-x",
        }
    }
}

/// Correlation key/value pairs propagated with the trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationContext {
    entries: Vec<(String, String)>,
}

impl CorrelationContext {
    /// Insert or replace a value within the configured limits.
    ///
    /// Returns `false` when the limits rejected the entry.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>, limits: &CorrelationConfig) -> bool {
        let key = key.into();
        let value = value.into();
        if key.is_empty() || value.chars().count() > limits.value_max_length {
            return false;
        }
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
            return true;
        }
        if self.entries.len() >= limits.element_max_number {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn encode(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let encoded: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}:{}", STANDARD.encode(k), STANDARD.encode(v)))
            .collect();
        Some(encoded.join(","))
    }

    fn decode(&mut self, value: &str, limits: &CorrelationConfig) {
        for pair in value.split(',') {
            let Some((key, val)) = pair.split_once(':') else {
                continue;
            };
            if let (Some(key), Some(val)) = (decode_field(key), decode_field(val)) {
                self.put(key, val, limits);
            }
        }
    }
}

/// Agent extension flags carried in `sw8-x`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionContext {
    /// The backend should skip analysis of the downstream segment.
    pub skip_analysis: bool,
    /// Epoch millis at which the sender injected the carrier.
    pub send_timestamp: Option<i64>,
}

impl ExtensionContext {
    fn encode(&self) -> Option<String> {
        if !self.skip_analysis && self.send_timestamp.is_none() {
            return None;
        }
        let mode = if self.skip_analysis { "1" } else { "0" };
        let timestamp = self
            .send_timestamp
            .map(|t| t.to_string())
            .unwrap_or_default();
        Some(format!("{}-{}", mode, timestamp))
    }

    fn decode(&mut self, value: &str) {
        let mut parts = value.split('-');
        self.skip_analysis = parts.next() == Some("1");
        self.send_timestamp = parts.next().and_then(|t| t.trim().parse().ok());
    }
}

/// Trace-continuation data exchanged across a process boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    pub trace_id: Option<TraceId>,
    pub parent_segment_id: Option<SegmentId>,
    pub parent_span_id: Option<SpanId>,
    pub parent_service: Option<String>,
    pub parent_instance: Option<String>,
    pub parent_endpoint: Option<String>,
    /// Address the client used to reach this process.
    pub network_address: Option<String>,
    pub sampled: Option<bool>,
    pub correlation: CorrelationContext,
    pub extension: ExtensionContext,
    #[serde(skip)]
    pub(crate) limits: CorrelationConfig,
}

impl Carrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a carrier that applies the given correlation limits on decode.
    pub fn with_correlation_limits(limits: CorrelationConfig) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Whether the carrier continues an existing trace.
    pub fn has_trace(&self) -> bool {
        self.trace_id.is_some()
    }

    /// Whether every parent coordinate is present.
    pub fn is_complete(&self) -> bool {
        self.trace_id.is_some()
            && self.parent_segment_id.is_some()
            && self.parent_span_id.is_some()
            && self.parent_service.is_some()
            && self.parent_instance.is_some()
            && self.parent_endpoint.is_some()
            && self.network_address.is_some()
    }

    pub fn correlation_limits(&self) -> &CorrelationConfig {
        &self.limits
    }

    /// Cursor over the header items in wire order.
    pub fn items(&mut self) -> CarrierItems<'_> {
        CarrierItems {
            carrier: self,
            position: 0,
        }
    }

    /// Serialized value of one header item, `None` when there is nothing to send.
    pub fn head_value(&self, key: HeaderKey) -> Option<String> {
        match key {
            HeaderKey::Sw8 => self.encode_sw8(),
            HeaderKey::Correlation => self.correlation.encode(),
            HeaderKey::Extension => self.extension.encode(),
        }
    }

    /// Decode one header item into this carrier.
    pub fn set_head_value(&mut self, key: HeaderKey, value: Option<&str>) {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return;
        };
        match key {
            HeaderKey::Sw8 => self.decode_sw8(value),
            HeaderKey::Correlation => self.correlation.decode(value, &self.limits),
            HeaderKey::Extension => self.extension.decode(value),
        }
    }

    /// Build a carrier by looking up each header item.
    pub fn extract_from<F>(mut lookup: F, limits: CorrelationConfig) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut carrier = Carrier::with_correlation_limits(limits);
        {
            let mut items = carrier.items();
            while let Some(mut item) = items.next_item() {
                let value = lookup(item.head_key());
                item.set_head_value(value.as_deref());
            }
        }
        carrier
    }

    /// Emit every non-empty header item.
    pub fn inject_into<F>(&self, mut put: F)
    where
        F: FnMut(&'static str, String),
    {
        for key in HeaderKey::ORDER {
            if let Some(value) = self.head_value(key) {
                put(key.as_str(), value);
            }
        }
    }

    pub(crate) fn stamp_send_time(&mut self) {
        self.extension.send_timestamp = Some(Utc::now().timestamp_millis());
    }

    fn encode_sw8(&self) -> Option<String> {
        let trace_id = self.trace_id.as_ref()?;
        let sample = if self.sampled.unwrap_or(true) { "1" } else { "0" };
        let span_id = self
            .parent_span_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        Some(
            [
                sample.to_string(),
                STANDARD.encode(trace_id.as_str()),
                encode_field(self.parent_segment_id.as_ref().map(SegmentId::as_str)),
                span_id,
                encode_field(self.parent_service.as_deref()),
                encode_field(self.parent_instance.as_deref()),
                encode_field(self.parent_endpoint.as_deref()),
                encode_field(self.network_address.as_deref()),
            ]
            .join("-"),
        )
    }

    fn decode_sw8(&mut self, value: &str) {
        let mut parts = value.split('-');
        self.sampled = parts.next().and_then(|s| match s {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        });
        self.trace_id = parts
            .next()
            .and_then(decode_field)
            .and_then(|s| TraceId::parse(&s));
        self.parent_segment_id = parts
            .next()
            .and_then(decode_field)
            .and_then(|s| SegmentId::parse(&s));
        self.parent_span_id = parts
            .next()
            .and_then(|s| s.parse::<i32>().ok())
            .filter(|id| *id >= 0)
            .map(SpanId::new);
        self.parent_service = parts.next().and_then(decode_field);
        self.parent_instance = parts.next().and_then(decode_field);
        self.parent_endpoint = parts.next().and_then(decode_field);
        self.network_address = parts.next().and_then(decode_field);
    }
}

fn encode_field(value: Option<&str>) -> String {
    value.map(|v| STANDARD.encode(v)).unwrap_or_default()
}

fn decode_field(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    STANDARD
        .decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|s| !s.is_empty())
}

/// Forward-only cursor over a carrier's header items.
pub struct CarrierItems<'a> {
    carrier: &'a mut Carrier,
    position: usize,
}

impl CarrierItems<'_> {
    pub fn has_next(&self) -> bool {
        self.position < HeaderKey::ORDER.len()
    }

    /// Advance to the next item.
    pub fn next_item(&mut self) -> Option<CarrierItem<'_>> {
        let key = *HeaderKey::ORDER.get(self.position)?;
        self.position += 1;
        Some(CarrierItem {
            key,
            carrier: &mut *self.carrier,
        })
    }
}

/// One header item, bound to the field group it reads and writes.
pub struct CarrierItem<'a> {
    key: HeaderKey,
    carrier: &'a mut Carrier,
}

impl CarrierItem<'_> {
    pub fn key(&self) -> HeaderKey {
        self.key
    }

    pub fn head_key(&self) -> &'static str {
        self.key.as_str()
    }

    pub fn head_value(&self) -> Option<String> {
        self.carrier.head_value(self.key)
    }

    pub fn set_head_value(&mut self, value: Option<&str>) {
        self.carrier.set_head_value(self.key, value);
    }
}

/// Extract a carrier from HTTP-style headers.
pub fn extract_from_headers(headers: &HashMap<String, String>) -> Carrier {
    Carrier::extract_from(|key| headers.get(key).cloned(), CorrelationConfig::default())
}

/// Inject a carrier into HTTP-style headers.
pub fn inject_into_headers(carrier: &Carrier, headers: &mut HashMap<String, String>) {
    carrier.inject_into(|key, value| {
        headers.insert(key.to_string(), value);
    });
}
