//! Binding of tracing and runtime contexts to execution units.
//!
//! The manager is the only structure shared between execution units. Each
//! unit's context pair lives in a [`DashMap`] entry created on first use and
//! removed as soon as the unit's span stack empties. Callers pass the unit
//! id explicitly instead of relying on thread-local state.

use crate::carrier::Carrier;
use crate::report::ReportSink;
use crate::runtime::RuntimeContext;
use crate::segment::{ContextSnapshot, TraceSegment};
use crate::span::Span;
use crate::tracing_context::{ServiceIdentity, StopOutcome, TracingContext};
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use std::sync::Arc;
use tracewire_core::config::{AgentConfig, CorrelationConfig};
use tracewire_core::{Error, ExecutionUnitId, Result, SpanId, TraceId};
use tracing::{debug, warn};

struct UnitContext {
    tracing: TracingContext,
    runtime: RuntimeContext,
}

pub struct ContextManager {
    identity: Arc<ServiceIdentity>,
    correlation_limits: CorrelationConfig,
    units: DashMap<ExecutionUnitId, UnitContext>,
    sink: Arc<dyn ReportSink>,
}

impl ContextManager {
    pub fn new(config: &AgentConfig, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            identity: Arc::new(ServiceIdentity::new(
                config.service_name.clone(),
                config.instance_name.clone(),
            )),
            correlation_limits: config.correlation.clone(),
            units: DashMap::new(),
            sink,
        }
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// A carrier that decodes with this agent's correlation limits.
    pub fn new_carrier(&self) -> Carrier {
        Carrier::with_correlation_limits(self.correlation_limits.clone())
    }

    fn unit_context(&self, unit: ExecutionUnitId) -> RefMut<'_, ExecutionUnitId, UnitContext> {
        self.units.entry(unit).or_insert_with(|| {
            debug!(unit = %unit, "Binding tracing context");
            UnitContext {
                tracing: TracingContext::with_correlation_limits(
                    unit,
                    self.identity.clone(),
                    self.correlation_limits.clone(),
                ),
                runtime: RuntimeContext::new(),
            }
        })
    }

    pub fn create_entry_span(
        &self,
        unit: ExecutionUnitId,
        operation_name: impl Into<String>,
        carrier: Option<&Carrier>,
    ) -> SpanId {
        self.unit_context(unit)
            .tracing
            .create_entry_span(operation_name, carrier)
    }

    pub fn create_exit_span(
        &self,
        unit: ExecutionUnitId,
        operation_name: impl Into<String>,
        peer: impl Into<String>,
    ) -> SpanId {
        self.unit_context(unit)
            .tracing
            .create_exit_span(operation_name, peer)
    }

    pub fn create_local_span(&self, unit: ExecutionUnitId, operation_name: impl Into<String>) -> SpanId {
        self.unit_context(unit).tracing.create_local_span(operation_name)
    }

    /// Start a local span on `unit` that continues a captured snapshot.
    pub fn continued(
        &self,
        unit: ExecutionUnitId,
        operation_name: impl Into<String>,
        snapshot: &ContextSnapshot,
    ) -> SpanId {
        self.unit_context(unit)
            .tracing
            .create_continued_span(operation_name, snapshot)
    }

    pub fn capture(&self, unit: ExecutionUnitId) -> Option<ContextSnapshot> {
        self.units.get(&unit).and_then(|cx| cx.tracing.capture())
    }

    pub fn inject(&self, unit: ExecutionUnitId, carrier: &mut Carrier) -> Result<()> {
        let cx = self.units.get(&unit).ok_or(Error::NoActiveSpan { unit })?;
        cx.tracing.inject(carrier)
    }

    /// Run `f` against the top of `unit`'s span stack.
    ///
    /// Fails with [`Error::NoActiveSpan`] when the stack is empty. `f` runs
    /// while the unit's entry is locked and must not call back into the manager.
    pub fn active_span<T>(&self, unit: ExecutionUnitId, f: impl FnOnce(&mut Span) -> T) -> Result<T> {
        let mut cx = self.units.get_mut(&unit).ok_or(Error::NoActiveSpan { unit })?;
        let span = cx
            .tracing
            .active_span_mut()
            .ok_or(Error::NoActiveSpan { unit })?;
        Ok(f(span))
    }

    /// Run `f` against `unit`'s runtime context, creating it on first use.
    ///
    /// The same locking rule as [`ContextManager::active_span`] applies.
    pub fn with_runtime_context<T>(&self, unit: ExecutionUnitId, f: impl FnOnce(&mut RuntimeContext) -> T) -> T {
        f(&mut self.unit_context(unit).runtime)
    }

    /// Finish the active span of `unit`.
    ///
    /// When the stack empties the segment goes to the sink and the unit's
    /// contexts are torn down. Returns `false` if there was nothing to stop.
    pub fn stop_span(&self, unit: ExecutionUnitId) -> bool {
        let outcome = match self.units.get_mut(&unit) {
            Some(mut cx) => cx.tracing.stop_span(),
            None => return false,
        };
        match outcome {
            StopOutcome::Stopped { .. } => true,
            StopOutcome::Sealed(segment) => {
                self.release(unit);
                self.report(segment);
                true
            }
            StopOutcome::Idle => {
                self.units
                    .remove_if(&unit, |_, cx| cx.tracing.depth() == 0);
                false
            }
        }
    }

    pub fn is_active(&self, unit: ExecutionUnitId) -> bool {
        self.units
            .get(&unit)
            .is_some_and(|cx| cx.tracing.depth() > 0)
    }

    pub fn depth(&self, unit: ExecutionUnitId) -> usize {
        self.units.get(&unit).map_or(0, |cx| cx.tracing.depth())
    }

    pub fn trace_id(&self, unit: ExecutionUnitId) -> Option<TraceId> {
        self.units
            .get(&unit)
            .and_then(|cx| cx.tracing.trace_id().cloned())
    }

    /// Number of execution units with bound contexts.
    pub fn bound_units(&self) -> usize {
        self.units.len()
    }

    fn release(&self, unit: ExecutionUnitId) {
        self.units.remove(&unit);
        debug!(unit = %unit, "Released tracing context");
    }

    fn report(&self, segment: TraceSegment) {
        let segment_id = segment.segment_id.clone();
        if let Err(e) = self.sink.submit(segment) {
            warn!(segment = %segment_id, error = %e, "Segment not reported");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ChannelSink;
    use crate::tag::TagKey;

    fn manager() -> (ContextManager, tokio::sync::mpsc::Receiver<TraceSegment>) {
        let (sink, rx) = ChannelSink::bounded(16);
        let config = AgentConfig {
            service_name: "orders".into(),
            instance_name: "orders-1".into(),
            ..AgentConfig::default()
        };
        (ContextManager::new(&config, Arc::new(sink)), rx)
    }

    #[test]
    fn test_active_span_requires_span() {
        let (manager, _rx) = manager();
        let unit = ExecutionUnitId::next();
        let err = manager.active_span(unit, |_| ()).unwrap_err();
        assert!(matches!(err, Error::NoActiveSpan { unit: u } if u == unit));
    }

    #[test]
    fn test_segment_reported_and_unit_released() {
        let (manager, mut rx) = manager();
        let unit = ExecutionUnitId::next();

        manager.create_entry_span(unit, "GET /", None);
        manager
            .active_span(unit, |span| span.tag(TagKey::HTTP_METHOD, "GET"))
            .unwrap();
        manager.with_runtime_context(unit, |rt| rt.put("flag", true));
        assert_eq!(manager.bound_units(), 1);

        assert!(manager.stop_span(unit));
        assert_eq!(manager.bound_units(), 0);

        let segment = rx.try_recv().unwrap();
        assert_eq!(segment.service, "orders");
        assert_eq!(segment.spans[0].tag_value(TagKey::HTTP_METHOD), Some("GET"));

        // Fresh runtime context after teardown.
        let seen = manager.with_runtime_context(unit, |rt| rt.contains("flag"));
        assert!(!seen);
    }

    #[test]
    fn test_double_stop_is_noop() {
        let (manager, mut rx) = manager();
        let unit = ExecutionUnitId::next();
        manager.create_local_span(unit, "work");
        assert!(manager.stop_span(unit));
        assert!(!manager.stop_span(unit));
        assert!(!manager.stop_span(ExecutionUnitId::next()));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_idle_stop_releases_runtime_only_unit() {
        let (manager, _rx) = manager();
        let unit = ExecutionUnitId::next();
        manager.with_runtime_context(unit, |rt| rt.put("x", 1u8));
        assert_eq!(manager.bound_units(), 1);
        assert!(!manager.stop_span(unit));
        assert_eq!(manager.bound_units(), 0);
    }

    #[test]
    fn test_units_are_isolated() {
        let (manager, _rx) = manager();
        let a = ExecutionUnitId::next();
        let b = ExecutionUnitId::next();

        manager.create_entry_span(a, "a", None);
        manager.create_entry_span(b, "b", None);
        manager.create_local_span(b, "b-inner");

        assert_eq!(manager.depth(a), 1);
        assert_eq!(manager.depth(b), 2);
        assert_ne!(manager.trace_id(a), manager.trace_id(b));

        manager.stop_span(a);
        assert!(!manager.is_active(a));
        assert!(manager.is_active(b));
    }

    #[test]
    fn test_full_sink_does_not_disturb_caller() {
        let (sink, _rx) = ChannelSink::bounded(1);
        let sink = Arc::new(sink);
        let manager = ContextManager::new(&AgentConfig::default(), sink.clone());

        for _ in 0..3 {
            let unit = ExecutionUnitId::next();
            manager.create_local_span(unit, "work");
            assert!(manager.stop_span(unit));
        }
        assert_eq!(sink.dropped(), 2);
        assert_eq!(manager.bound_units(), 0);
    }
}
