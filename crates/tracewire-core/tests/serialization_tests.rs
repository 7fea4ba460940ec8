//! Serialization tests for tracewire-core types.

use pretty_assertions::assert_eq;
use tracewire_core::config::AgentConfig;
use tracewire_core::ids::*;

#[test]
fn test_ids_serialize_transparently() {
    let trace_id = TraceId::parse("abc.1.2").expect("trace id");
    let json = serde_json::to_string(&trace_id).expect("serialize");
    assert_eq!(json, "\"abc.1.2\"");

    let span_id = SpanId::new(3);
    assert_eq!(serde_json::to_string(&span_id).expect("serialize"), "3");

    let parsed: SegmentId = serde_json::from_str("\"seg\"").expect("deserialize");
    assert_eq!(parsed.as_str(), "seg");
}

#[test]
fn test_config_yaml_roundtrip() {
    let mut config = AgentConfig::default();
    config.service_name = "orders".to_string();
    config.plugin.http.headers_length_threshold = 64;

    let yaml = serde_yaml::to_string(&config).expect("serialize");
    let parsed = AgentConfig::from_yaml_str(&yaml).expect("deserialize");

    assert_eq!(parsed.service_name, "orders");
    assert_eq!(parsed.instance_name, config.instance_name);
    assert_eq!(parsed.plugin.http.headers_length_threshold, 64);
}

#[test]
fn test_config_from_missing_file_is_io_error() {
    let err = AgentConfig::from_file(std::path::Path::new("/nonexistent/tracewire.yaml"))
        .expect_err("missing file");
    assert!(matches!(err, tracewire_core::Error::Io(_)));
}
