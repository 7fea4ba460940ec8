//! Spans: timed, tagged units of work inside a segment.

use crate::segment::SegmentRef;
use crate::tag::{LengthThreshold, TagKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::error::Error as StdError;
use tracewire_core::SpanId;

/// Where a span sits relative to the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Inbound call served by this process.
    Entry,
    /// Outbound call to a remote peer.
    Exit,
    /// In-process work.
    Local,
}

/// Technology layer of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanLayer {
    Database,
    RpcFramework,
    Http,
    Mq,
    Cache,
    Faas,
}

/// Library or framework that produced a span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Component(Cow<'static, str>);

impl Component {
    pub const SOLON_MVC: Component = Component(Cow::Borrowed("SolonMVC"));
    pub const REDISSON: Component = Component(Cow::Borrowed("Redisson"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// A timestamped record attached to a span, usually an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    id: SpanId,
    parent_id: Option<SpanId>,
    kind: SpanKind,
    operation_name: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    tags: Vec<Tag>,
    component: Option<Component>,
    layer: Option<SpanLayer>,
    is_error: bool,
    logs: Vec<LogEntry>,
    peer: Option<String>,
    refs: Vec<SegmentRef>,
}

impl Span {
    pub(crate) fn new(
        id: SpanId,
        parent_id: Option<SpanId>,
        kind: SpanKind,
        operation_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            kind,
            operation_name: operation_name.into(),
            start_time: Utc::now(),
            end_time: None,
            tags: Vec::new(),
            component: None,
            layer: None,
            is_error: false,
            logs: Vec::new(),
            peer: None,
            refs: Vec::new(),
        }
    }

    pub fn id(&self) -> SpanId {
        self.id
    }

    /// Parent within the same segment, `None` for the segment's root span.
    pub fn parent_id(&self) -> Option<SpanId> {
        self.parent_id
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn set_operation_name(&mut self, name: impl Into<String>) {
        self.operation_name = name.into();
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }

    /// Record or overwrite a tag. Tags keep their first insertion order.
    pub fn tag(&mut self, key: TagKey, value: impl Into<String>) {
        self.tag_raw(key.as_str(), value.into());
    }

    /// Record a tag under the given length policy.
    ///
    /// Returns `false` when the policy omitted the tag.
    pub fn tag_with_threshold(&mut self, key: TagKey, value: &str, threshold: LengthThreshold) -> bool {
        match threshold.apply(value) {
            Some(kept) => {
                self.tag_raw(key.as_str(), kept.to_string());
                true
            }
            None => false,
        }
    }

    fn tag_raw(&mut self, key: &str, value: String) {
        match self.tags.iter_mut().find(|t| t.key == key) {
            Some(existing) => existing.value = value,
            None => self.tags.push(Tag {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn tag_value(&self, key: TagKey) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key.as_str())
            .map(|t| t.value.as_str())
    }

    pub fn set_component(&mut self, component: Component) {
        self.component = Some(component);
    }

    pub fn component(&self) -> Option<&Component> {
        self.component.as_ref()
    }

    pub fn set_layer(&mut self, layer: SpanLayer) {
        self.layer = Some(layer);
    }

    pub fn layer(&self) -> Option<SpanLayer> {
        self.layer
    }

    pub fn error_occurred(&mut self) {
        self.is_error = true;
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Log an error together with its source chain.
    pub fn log_error<E: StdError + ?Sized>(&mut self, error: &E) {
        let causes: Vec<String> = std::iter::successors(error.source(), |&e| e.source())
            .map(|e| e.to_string())
            .collect();
        let mut fields = vec![
            ("event".to_string(), "error".to_string()),
            ("error.kind".to_string(), std::any::type_name::<E>().to_string()),
            ("message".to_string(), error.to_string()),
        ];
        if !causes.is_empty() {
            fields.push(("stack".to_string(), causes.join("\ncaused by: ")));
        }
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            fields,
        });
    }

    pub fn log(&mut self, fields: Vec<(String, String)>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            fields,
        });
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn set_peer(&mut self, peer: impl Into<String>) {
        self.peer = Some(peer.into());
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub(crate) fn add_ref(&mut self, segment_ref: SegmentRef) {
        self.refs.push(segment_ref);
    }

    pub fn refs(&self) -> &[SegmentRef] {
        &self.refs
    }

    /// Stamp the end time. A finished span keeps its first end time.
    pub(crate) fn finish(&mut self, at: DateTime<Utc>) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Wrapped(std::io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_tags_keep_insertion_order_and_overwrite() {
        let mut span = Span::new(SpanId::FIRST, None, SpanKind::Entry, "GET /");
        span.tag(TagKey::URL, "http://a/");
        span.tag(TagKey::HTTP_METHOD, "GET");
        span.tag(TagKey::URL, "http://b/");

        let keys: Vec<&str> = span.tags().iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["url", "http.method"]);
        assert_eq!(span.tag_value(TagKey::URL), Some("http://b/"));
    }

    #[test]
    fn test_tag_with_threshold() {
        let mut span = Span::new(SpanId::FIRST, None, SpanKind::Entry, "op");
        assert!(span.tag_with_threshold(TagKey::HTTP_BODY, "abcdefgh", LengthThreshold::new(5)));
        assert!(!span.tag_with_threshold(TagKey::HTTP_PARAMS, "abcdefgh", LengthThreshold::new(0)));
        assert_eq!(span.tag_value(TagKey::HTTP_BODY), Some("abcde"));
        assert_eq!(span.tag_value(TagKey::HTTP_PARAMS), None);
    }

    #[test]
    fn test_finish_sets_end_time_once() {
        let mut span = Span::new(SpanId::FIRST, None, SpanKind::Local, "op");
        let first = Utc::now();
        assert!(span.finish(first));
        assert!(!span.finish(first + chrono::Duration::seconds(5)));
        assert_eq!(span.end_time(), Some(first));
    }

    #[test]
    fn test_log_error_records_source_chain() {
        let mut span = Span::new(SpanId::FIRST, None, SpanKind::Entry, "op");
        let err = Wrapped(std::io::Error::other("connection reset"));
        span.error_occurred();
        span.log_error(&err);

        assert!(span.is_error());
        let entry = &span.logs()[0];
        assert_eq!(entry.field("event"), Some("error"));
        assert_eq!(entry.field("message"), Some("request failed"));
        assert_eq!(entry.field("stack"), Some("connection reset"));
        assert!(entry.field("error.kind").unwrap().ends_with("Wrapped"));
    }
}
