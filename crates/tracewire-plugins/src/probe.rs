//! Version-tolerant lookups over [`Introspect`](crate::reflect::Introspect) objects.

use crate::reflect::ProbeError;
use tracing::{debug, warn};

type Accessor<S, T> = Box<dyn Fn(&S) -> Result<Option<T>, ProbeError> + Send + Sync>;

/// An ordered list of named accessors tried in priority order.
///
/// The first accessor yielding a value wins. Accessor failures are logged
/// and never leave [`CapabilityProbe::probe`].
pub struct CapabilityProbe<S: ?Sized, T> {
    name: &'static str,
    accessors: Vec<(&'static str, Accessor<S, T>)>,
}

impl<S: ?Sized, T> CapabilityProbe<S, T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            accessors: Vec::new(),
        }
    }

    /// Append an accessor with lower priority than those already added.
    pub fn with<F>(mut self, accessor: &'static str, f: F) -> Self
    where
        F: Fn(&S) -> Result<Option<T>, ProbeError> + Send + Sync + 'static,
    {
        self.accessors.push((accessor, Box::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }

    /// Try each accessor in order.
    ///
    /// Individual failures are logged at debug. If every accessor came up
    /// empty and at least one of them failed, a single warning is emitted.
    pub fn probe(&self, subject: &S) -> Option<T> {
        let mut failures = 0usize;
        for (accessor, f) in &self.accessors {
            match f(subject) {
                Ok(Some(value)) => {
                    debug!(probe = self.name, accessor, "Probe resolved");
                    return Some(value);
                }
                Ok(None) => debug!(probe = self.name, accessor, "Accessor yielded no value"),
                Err(e) => {
                    failures += 1;
                    debug!(probe = self.name, accessor, error = %e, "Accessor failed");
                }
            }
        }
        if failures > 0 {
            warn!(
                probe = self.name,
                failures,
                accessors = self.accessors.len(),
                "No accessor resolved a value"
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FieldValue, Introspect, ObjectValue};
    use crate::testing::WarnCounter;

    fn text_probe() -> CapabilityProbe<dyn Introspect, String> {
        CapabilityProbe::<dyn Introspect, String>::new("test")
            .with("current", |object| match object.field("current")? {
                FieldValue::Text(s) => Ok(Some(s)),
                _ => Ok(None),
            })
            .with("legacy", |object| match object.field("legacy")? {
                FieldValue::Text(s) => Ok(Some(s)),
                _ => Ok(None),
            })
    }

    #[test]
    fn test_first_success_wins() {
        let object = ObjectValue::new("Subject")
            .with("current", "new")
            .with("legacy", "old");
        assert_eq!(text_probe().probe(&object).as_deref(), Some("new"));
    }

    #[test]
    fn test_falls_back_after_error() {
        let object = ObjectValue::new("Subject").with("legacy", "old");
        assert_eq!(text_probe().probe(&object).as_deref(), Some("old"));
    }

    #[test]
    fn test_falls_back_after_empty_value() {
        let object = ObjectValue::new("Subject")
            .with("current", FieldValue::Null)
            .with("legacy", "old");
        assert_eq!(text_probe().probe(&object).as_deref(), Some("old"));
    }

    #[test]
    fn test_exhausted_probe_yields_none() {
        let object = ObjectValue::new("Subject");
        let probe = text_probe();
        assert_eq!(probe.len(), 2);
        assert_eq!(probe.probe(&object), None);
    }

    #[test]
    fn test_exhausted_after_failures_warns_once() {
        let object = ObjectValue::new("Subject");
        let (value, warnings) = WarnCounter::capture(|| text_probe().probe(&object));
        assert_eq!(value, None);
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_exhausted_without_failures_does_not_warn() {
        let object = ObjectValue::new("Subject")
            .with("current", FieldValue::Null)
            .with("legacy", FieldValue::Null);
        let (value, warnings) = WarnCounter::capture(|| text_probe().probe(&object));
        assert_eq!(value, None);
        assert_eq!(warnings, 0);
    }

    #[test]
    fn test_fallback_success_does_not_warn() {
        let object = ObjectValue::new("Subject").with("legacy", "old");
        let (value, warnings) = WarnCounter::capture(|| text_probe().probe(&object));
        assert_eq!(value.as_deref(), Some("old"));
        assert_eq!(warnings, 0);
    }
}
