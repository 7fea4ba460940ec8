//! Tracing engine for the Tracewire agent.
//!
//! Provides cross-process context propagation, the per-execution-unit span
//! stack, the execution-unit context binding and the hand-off of sealed
//! segments to a reporting pipeline.

pub mod agent;
pub mod carrier;
pub mod hooks;
pub mod logging;
pub mod manager;
pub mod peer;
pub mod report;
pub mod runtime;
pub mod segment;
pub mod span;
pub mod tag;
pub mod tracing_context;

pub use agent::TracingAgent;
pub use carrier::{
    Carrier, CarrierItem, CarrierItems, CorrelationContext, HeaderKey, extract_from_headers,
    inject_into_headers,
};
pub use hooks::{CallPhase, CallToken, Interceptor, Invocation, MethodDescriptor, around};
pub use logging::{TracerError, init_logging};
pub use manager::ContextManager;
pub use peer::shorten_peer;
pub use report::{ChannelSink, LogExporter, ReportSink, SegmentExporter, spawn_reporter};
pub use runtime::RuntimeContext;
pub use segment::{ContextSnapshot, RefType, SegmentRef, TraceSegment};
pub use span::{Component, LogEntry, Span, SpanKind, SpanLayer, Tag};
pub use tag::{LengthThreshold, TagKey};
pub use tracing_context::{ServiceIdentity, StopOutcome, TracingContext};
