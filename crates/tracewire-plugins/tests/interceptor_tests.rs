//! Interceptors driven through the full call-phase sequence.

use pretty_assertions::assert_eq;
use std::borrow::{Borrow, BorrowMut};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracewire_core::config::HttpPluginConfig;
use tracewire_core::{AgentConfig, ExecutionUnitId};
use tracewire_plugins::http::TRY_HANDLE;
use tracewire_plugins::redis::CREATE_CLIENT;
use tracewire_plugins::{
    ConnectionManagerInterceptor, FieldValue, HttpEntryInterceptor, HttpExchange, Introspect,
    ObjectValue, PeerAware,
};
use tracewire_trace::{
    ChannelSink, ContextManager, Invocation, TagKey, TraceSegment, around, inject_into_headers,
};

#[derive(Debug, Clone, PartialEq)]
struct HandlerError(&'static str);

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler error: {}", self.0)
    }
}

impl StdError for HandlerError {}

#[derive(Default)]
struct Exchange {
    headers: HashMap<String, String>,
    status: u16,
    error: Option<HandlerError>,
}

impl HttpExchange for Exchange {
    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).cloned()
    }
    fn method(&self) -> &str {
        "GET"
    }
    fn path(&self) -> &str {
        "/users/7"
    }
    fn url(&self) -> String {
        "http://api.local/users/7".to_string()
    }
    fn headers_display(&self) -> String {
        format!("{:?}", self.headers)
    }
    fn body(&self) -> Option<String> {
        None
    }
    fn params_display(&self) -> String {
        "{}".to_string()
    }
    fn status(&self) -> u16 {
        self.status
    }
    fn error(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.as_ref().map(|e| e as &(dyn StdError + 'static))
    }
}

fn agent(service: &str) -> (Arc<ContextManager>, Receiver<TraceSegment>) {
    let (sink, rx) = ChannelSink::bounded(16);
    let config = AgentConfig {
        service_name: service.to_string(),
        ..AgentConfig::default()
    };
    (Arc::new(ContextManager::new(&config, Arc::new(sink))), rx)
}

fn handle(
    interceptor: &HttpEntryInterceptor,
    exchange: &Exchange,
    outcome: Result<(), HandlerError>,
) -> Result<(), HandlerError> {
    let args: &(dyn HttpExchange + 'static) = exchange;
    let invocation = Invocation::new(ExecutionUnitId::next(), &TRY_HANDLE, &(), args);
    around(interceptor, &invocation, || outcome)
}

#[test]
fn test_request_continues_upstream_trace() {
    let (upstream, mut upstream_rx) = agent("gateway");
    let unit = ExecutionUnitId::next();
    upstream.create_entry_span(unit, "GET /users", None);
    upstream.create_exit_span(unit, "GET /users/7", "api.local:80");
    let mut carrier = upstream.new_carrier();
    upstream.inject(unit, &mut carrier).unwrap();
    let mut headers = HashMap::new();
    inject_into_headers(&carrier, &mut headers);

    let (manager, mut rx) = agent("users");
    let interceptor = HttpEntryInterceptor::new(manager.clone(), HttpPluginConfig::default());
    let exchange = Exchange {
        headers,
        status: 200,
        ..Exchange::default()
    };
    handle(&interceptor, &exchange, Ok(())).unwrap();

    upstream.stop_span(unit);
    upstream.stop_span(unit);
    let upstream_segment = upstream_rx.try_recv().unwrap();
    let segment = rx.try_recv().unwrap();
    assert_eq!(segment.trace_id, upstream_segment.trace_id);

    let span = segment.first_span().unwrap();
    assert_eq!(span.operation_name(), "Solon:GET:/users/7");
    assert_eq!(span.tag_value(TagKey::URL), Some("http://api.local/users/7"));
    assert_eq!(span.tag_value(TagKey::HTTP_STATUS_CODE), Some("200"));
    assert_eq!(span.tag_value(TagKey::HTTP_HEADERS), None);
    assert!(!span.is_error());
    assert_eq!(span.refs().len(), 1);
    assert_eq!(manager.bound_units(), 0);
}

#[test]
fn test_handler_error_tags_500_and_is_rethrown() {
    let (manager, mut rx) = agent("users");
    let interceptor = HttpEntryInterceptor::new(manager, HttpPluginConfig::default());
    let exchange = Exchange {
        status: 200,
        error: Some(HandlerError("boom")),
        ..Exchange::default()
    };

    let result = handle(&interceptor, &exchange, Err(HandlerError("boom")));
    assert_eq!(result, Err(HandlerError("boom")));

    let segment = rx.try_recv().unwrap();
    let span = segment.first_span().unwrap();
    assert_eq!(span.tag_value(TagKey::HTTP_STATUS_CODE), Some("500"));
    assert!(span.is_error());
    assert_eq!(span.logs().len(), 1);
    assert_eq!(span.logs()[0].field("message"), Some("handler error: boom"));
}

#[test]
fn test_after_exception_handling_does_not_log_twice() {
    let config = HttpPluginConfig {
        after_exception_handling: true,
        ..HttpPluginConfig::default()
    };
    let (manager, mut rx) = agent("users");
    let interceptor = HttpEntryInterceptor::new(manager.clone(), config);
    let exchange = Exchange {
        status: 503,
        error: Some(HandlerError("unavailable")),
        ..Exchange::default()
    };

    assert!(handle(&interceptor, &exchange, Err(HandlerError("unavailable"))).is_err());

    let segment = rx.try_recv().unwrap();
    let span = segment.first_span().unwrap();
    assert_eq!(span.tag_value(TagKey::HTTP_STATUS_CODE), Some("503"));
    assert!(span.is_error());
    assert_eq!(span.logs().len(), 1);
    assert_eq!(manager.bound_units(), 0);
}

#[test]
fn test_after_exception_handling_records_handled_error() {
    let config = HttpPluginConfig {
        after_exception_handling: true,
        ..HttpPluginConfig::default()
    };
    let (manager, mut rx) = agent("users");
    let interceptor = HttpEntryInterceptor::new(manager, config);
    let exchange = Exchange {
        status: 404,
        error: Some(HandlerError("not found")),
        ..Exchange::default()
    };

    handle(&interceptor, &exchange, Ok(())).unwrap();

    let segment = rx.try_recv().unwrap();
    let span = segment.first_span().unwrap();
    assert_eq!(span.tag_value(TagKey::HTTP_STATUS_CODE), Some("404"));
    assert!(span.is_error());
    assert_eq!(span.logs().len(), 1);
}

#[test]
fn test_params_tagged_when_enabled() {
    let config = HttpPluginConfig {
        params_length_threshold: -1,
        ..HttpPluginConfig::default()
    };
    let (manager, mut rx) = agent("users");
    let interceptor = HttpEntryInterceptor::new(manager, config);
    let exchange = Exchange {
        status: 200,
        ..Exchange::default()
    };

    handle(&interceptor, &exchange, Ok(())).unwrap();

    let segment = rx.try_recv().unwrap();
    assert_eq!(segment.spans[0].tag_value(TagKey::HTTP_PARAMS), Some("{}"));
}

#[derive(Default)]
struct RedisClient {
    peer: Option<String>,
}

impl PeerAware for RedisClient {
    fn set_peer(&mut self, peer: String) {
        self.peer = Some(peer);
    }
}

impl Borrow<dyn PeerAware> for RedisClient {
    fn borrow(&self) -> &(dyn PeerAware + 'static) {
        self
    }
}

impl BorrowMut<dyn PeerAware> for RedisClient {
    fn borrow_mut(&mut self) -> &mut (dyn PeerAware + 'static) {
        self
    }
}

fn create_client(manager: &ObjectValue) -> Result<RedisClient, HandlerError> {
    let interceptor = ConnectionManagerInterceptor::from_config(&AgentConfig::default());
    let target: &(dyn Introspect + 'static) = manager;
    let invocation = Invocation::new(ExecutionUnitId::next(), &CREATE_CLIENT, target, &());
    around(&interceptor, &invocation, || Ok(RedisClient::default()))
}

fn manager_with(config: ObjectValue) -> ObjectValue {
    ObjectValue::new("MasterSlaveConnectionManager").with("cfg", config)
}

#[test]
fn test_created_client_receives_single_server_peer() {
    let manager = manager_with(
        ObjectValue::new("Config").with(
            "singleServerConfig",
            ObjectValue::new("SingleServerConfig").with("address", "redis://cache:6379"),
        ),
    );
    let client = create_client(&manager).unwrap();
    assert_eq!(client.peer.as_deref(), Some("cache:6379"));
}

#[test]
fn test_sentinel_uri_addresses() {
    let sentinels = vec![
        FieldValue::Uri(url::Url::parse("redis://s1:26379").unwrap()),
        FieldValue::Uri(url::Url::parse("redis://s2:26379").unwrap()),
    ];
    let manager = manager_with(ObjectValue::new("Config").with(
        "sentinelServersConfig",
        ObjectValue::new("SentinelServersConfig").with("sentinelAddresses", sentinels),
    ));
    let client = create_client(&manager).unwrap();
    assert_eq!(client.peer.as_deref(), Some("s1:26379;s2:26379;"));
}

#[test]
fn test_unresolvable_address_leaves_call_untouched() {
    let manager = manager_with(ObjectValue::new("Config").with(
        "singleServerConfig",
        ObjectValue::new("SingleServerConfig").with("address", FieldValue::Boolean(true)),
    ));
    let client = create_client(&manager).unwrap();
    assert!(client.peer.is_none());
}

#[test]
fn test_failed_client_creation_is_passed_through() {
    let interceptor = ConnectionManagerInterceptor::new(200);
    let manager = ObjectValue::new("MasterSlaveConnectionManager");
    let target: &(dyn Introspect + 'static) = &manager;
    let invocation = Invocation::new(ExecutionUnitId::next(), &CREATE_CLIENT, target, &());
    let result: Result<RedisClient, HandlerError> =
        around(&interceptor, &invocation, || Err(HandlerError("refused")));
    assert!(matches!(result, Err(HandlerError("refused"))));
}
