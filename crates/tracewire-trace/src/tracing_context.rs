//! The span stack of one execution unit.
//!
//! A [`TracingContext`] is owned by exactly one execution unit and is never
//! shared, so it carries no locking. Spans are pushed by the `create_*`
//! operations and popped in strict reverse order by [`TracingContext::stop_span`];
//! when the stack empties the segment is sealed and handed back to the caller.

use crate::carrier::{Carrier, CorrelationContext};
use crate::segment::{ContextSnapshot, SegmentRef, TraceSegment};
use crate::span::{Span, SpanKind};
use chrono::Utc;
use std::sync::Arc;
use tracewire_core::config::CorrelationConfig;
use tracewire_core::{Error, ExecutionUnitId, Result, SegmentId, SpanId, TraceId};
use tracing::debug;

/// Service coordinates stamped onto segments and outbound carriers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service: String,
    pub instance: String,
}

impl ServiceIdentity {
    pub fn new(service: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            instance: instance.into(),
        }
    }
}

/// Result of popping the span stack.
#[derive(Debug)]
pub enum StopOutcome {
    /// The stack was already empty; nothing happened.
    Idle,
    /// A span was finished and others remain active.
    Stopped { remaining: usize },
    /// The last span was finished and the segment sealed.
    Sealed(TraceSegment),
}

struct OpenSegment {
    segment_id: SegmentId,
    trace_id: Option<TraceId>,
    finished: Vec<Span>,
}

impl OpenSegment {
    fn new() -> Self {
        Self {
            segment_id: SegmentId::generate(),
            trace_id: None,
            finished: Vec::new(),
        }
    }
}

pub struct TracingContext {
    unit: ExecutionUnitId,
    identity: Arc<ServiceIdentity>,
    segment: OpenSegment,
    active: Vec<Span>,
    next_span_id: SpanId,
    primary_endpoint: Option<String>,
    correlation: CorrelationContext,
    correlation_limits: CorrelationConfig,
}

impl TracingContext {
    pub fn new(unit: ExecutionUnitId, identity: Arc<ServiceIdentity>) -> Self {
        Self::with_correlation_limits(unit, identity, CorrelationConfig::default())
    }

    pub fn with_correlation_limits(
        unit: ExecutionUnitId,
        identity: Arc<ServiceIdentity>,
        correlation_limits: CorrelationConfig,
    ) -> Self {
        Self {
            unit,
            identity,
            segment: OpenSegment::new(),
            active: Vec::new(),
            next_span_id: SpanId::FIRST,
            primary_endpoint: None,
            correlation: CorrelationContext::default(),
            correlation_limits,
        }
    }

    pub fn unit(&self) -> ExecutionUnitId {
        self.unit
    }

    /// Trace of the open segment, assigned when its first span was created.
    pub fn trace_id(&self) -> Option<&TraceId> {
        self.segment.trace_id.as_ref()
    }

    pub fn segment_id(&self) -> &SegmentId {
        &self.segment.segment_id
    }

    /// Number of spans currently on the stack.
    pub fn depth(&self) -> usize {
        self.active.len()
    }

    pub fn active_span(&self) -> Option<&Span> {
        self.active.last()
    }

    pub fn active_span_mut(&mut self) -> Option<&mut Span> {
        self.active.last_mut()
    }

    pub fn correlation(&self) -> &CorrelationContext {
        &self.correlation
    }

    pub fn put_correlation(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.correlation.put(key, value, &self.correlation_limits)
    }

    /// Push an entry span, continuing the carrier's trace when it has one.
    pub fn create_entry_span(
        &mut self,
        operation_name: impl Into<String>,
        carrier: Option<&Carrier>,
    ) -> SpanId {
        let mut span = self.open_span(SpanKind::Entry, operation_name);
        if let Some(segment_ref) = carrier.and_then(SegmentRef::from_carrier) {
            if self.join_trace(&segment_ref.trace_id) {
                if let Some(carrier) = carrier {
                    self.merge_correlation(&carrier.correlation);
                }
                span.add_ref(segment_ref);
            }
        }
        self.push(span)
    }

    /// Push a span for an outbound call to `peer`.
    pub fn create_exit_span(&mut self, operation_name: impl Into<String>, peer: impl Into<String>) -> SpanId {
        let mut span = self.open_span(SpanKind::Exit, operation_name);
        span.set_peer(peer);
        self.push(span)
    }

    /// Push a span for in-process work.
    pub fn create_local_span(&mut self, operation_name: impl Into<String>) -> SpanId {
        let span = self.open_span(SpanKind::Local, operation_name);
        self.push(span)
    }

    /// Push a local span that continues a snapshot captured on another unit.
    pub fn create_continued_span(
        &mut self,
        operation_name: impl Into<String>,
        snapshot: &ContextSnapshot,
    ) -> SpanId {
        let mut span = self.open_span(SpanKind::Local, operation_name);
        if self.join_trace(&snapshot.trace_id) {
            self.merge_correlation(&snapshot.correlation);
            span.add_ref(SegmentRef::from_snapshot(
                snapshot,
                &self.identity.service,
                &self.identity.instance,
            ));
        }
        self.push(span)
    }

    /// Pop and finish the active span.
    ///
    /// Calling this on an empty stack is a no-op.
    pub fn stop_span(&mut self) -> StopOutcome {
        let Some(mut span) = self.active.pop() else {
            debug!(unit = %self.unit, "stop_span on empty stack ignored");
            return StopOutcome::Idle;
        };
        span.finish(Utc::now());
        self.segment.finished.push(span);

        if self.active.is_empty() {
            StopOutcome::Sealed(self.seal())
        } else {
            StopOutcome::Stopped {
                remaining: self.active.len(),
            }
        }
    }

    /// Fill `carrier` from the active exit span.
    pub fn inject(&self, carrier: &mut Carrier) -> Result<()> {
        let span = self
            .active
            .last()
            .ok_or(Error::NoActiveSpan { unit: self.unit })?;
        if span.kind() != SpanKind::Exit {
            return Err(Error::NotExitSpan);
        }
        carrier.trace_id = self.segment.trace_id.clone();
        carrier.parent_segment_id = Some(self.segment.segment_id.clone());
        carrier.parent_span_id = Some(span.id());
        carrier.parent_service = Some(self.identity.service.clone());
        carrier.parent_instance = Some(self.identity.instance.clone());
        carrier.parent_endpoint = self.primary_endpoint.clone();
        carrier.network_address = span.peer().map(str::to_string);
        carrier.sampled = Some(true);
        carrier.correlation = self.correlation.clone();
        carrier.stamp_send_time();
        Ok(())
    }

    /// Capture the active position so another unit can continue the trace.
    pub fn capture(&self) -> Option<ContextSnapshot> {
        let span = self.active.last()?;
        Some(ContextSnapshot {
            trace_id: self.segment.trace_id.clone()?,
            segment_id: self.segment.segment_id.clone(),
            span_id: span.id(),
            parent_endpoint: self.primary_endpoint.clone(),
            correlation: self.correlation.clone(),
        })
    }

    fn open_span(&mut self, kind: SpanKind, operation_name: impl Into<String>) -> Span {
        let id = self.next_span_id;
        self.next_span_id = id.next();
        Span::new(id, self.active.last().map(Span::id), kind, operation_name)
    }

    fn push(&mut self, span: Span) -> SpanId {
        if self.segment.trace_id.is_none() {
            self.segment.trace_id = Some(TraceId::generate());
        }
        let starts_segment = self.active.is_empty() && self.segment.finished.is_empty();
        if starts_segment || (self.primary_endpoint.is_none() && span.kind() == SpanKind::Entry) {
            self.primary_endpoint = Some(span.operation_name().to_string());
        }
        let id = span.id();
        self.active.push(span);
        id
    }

    /// Adopt `trace_id` for the segment unless a different one is already set.
    fn join_trace(&mut self, trace_id: &TraceId) -> bool {
        match self.segment.trace_id.as_ref() {
            None => {
                self.segment.trace_id = Some(trace_id.clone());
                true
            }
            Some(current) if current == trace_id => true,
            Some(current) => {
                debug!(
                    unit = %self.unit,
                    current = %current,
                    inbound = %trace_id,
                    "Ignoring parent from another trace"
                );
                false
            }
        }
    }

    fn merge_correlation(&mut self, inbound: &CorrelationContext) {
        for (key, value) in inbound.iter() {
            self.correlation.put(key, value, &self.correlation_limits);
        }
    }

    fn seal(&mut self) -> TraceSegment {
        let open = std::mem::replace(&mut self.segment, OpenSegment::new());
        self.next_span_id = SpanId::FIRST;
        self.primary_endpoint = None;
        self.correlation = CorrelationContext::default();

        let segment = TraceSegment {
            segment_id: open.segment_id,
            trace_id: open.trace_id.unwrap_or_else(TraceId::generate),
            service: self.identity.service.clone(),
            instance: self.identity.instance.clone(),
            spans: open.finished,
            sealed_at: Utc::now(),
        };
        debug!(
            unit = %self.unit,
            segment = %segment.segment_id,
            trace = %segment.trace_id,
            spans = segment.spans.len(),
            "Segment sealed"
        );
        segment
    }
}
