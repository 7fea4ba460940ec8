//! Segments and the references that link them into one trace.

use crate::carrier::{Carrier, CorrelationContext};
use crate::span::Span;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracewire_core::{SegmentId, SpanId, TraceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    CrossProcess,
    CrossThread,
}

/// Link from a span to the span in another segment that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub ref_type: RefType,
    pub trace_id: TraceId,
    pub parent_segment_id: Option<SegmentId>,
    pub parent_span_id: Option<SpanId>,
    pub parent_service: Option<String>,
    pub parent_instance: Option<String>,
    pub parent_endpoint: Option<String>,
    pub network_address: Option<String>,
}

impl SegmentRef {
    /// Build a cross-process reference. Carriers without a trace id yield none.
    pub fn from_carrier(carrier: &Carrier) -> Option<Self> {
        let trace_id = carrier.trace_id.clone()?;
        Some(Self {
            ref_type: RefType::CrossProcess,
            trace_id,
            parent_segment_id: carrier.parent_segment_id.clone(),
            parent_span_id: carrier.parent_span_id,
            parent_service: carrier.parent_service.clone(),
            parent_instance: carrier.parent_instance.clone(),
            parent_endpoint: carrier.parent_endpoint.clone(),
            network_address: carrier.network_address.clone(),
        })
    }

    pub fn from_snapshot(snapshot: &ContextSnapshot, service: &str, instance: &str) -> Self {
        Self {
            ref_type: RefType::CrossThread,
            trace_id: snapshot.trace_id.clone(),
            parent_segment_id: Some(snapshot.segment_id.clone()),
            parent_span_id: Some(snapshot.span_id),
            parent_service: Some(service.to_string()),
            parent_instance: Some(instance.to_string()),
            parent_endpoint: snapshot.parent_endpoint.clone(),
            network_address: None,
        }
    }
}

/// State captured on one execution unit so another unit can join the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot {
    pub trace_id: TraceId,
    pub segment_id: SegmentId,
    pub span_id: SpanId,
    pub parent_endpoint: Option<String>,
    pub correlation: CorrelationContext,
}

/// Finished spans of one execution unit, sealed when its span stack emptied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSegment {
    pub segment_id: SegmentId,
    pub trace_id: TraceId,
    pub service: String,
    pub instance: String,
    pub spans: Vec<Span>,
    pub sealed_at: DateTime<Utc>,
}

impl TraceSegment {
    /// The span that opened the segment.
    pub fn first_span(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.parent_id().is_none())
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    pub fn has_error(&self) -> bool {
        self.spans.iter().any(Span::is_error)
    }
}
