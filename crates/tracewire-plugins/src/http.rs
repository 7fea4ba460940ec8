//! Entry spans for inbound Solon HTTP requests.

use std::error::Error as StdError;
use std::sync::Arc;
use tracewire_core::ExecutionUnitId;
use tracewire_core::config::HttpPluginConfig;
use tracewire_trace::{
    CallPhase, Component, ContextManager, Interceptor, Invocation, LengthThreshold,
    MethodDescriptor, SpanLayer, TagKey,
};
use tracing::warn;

/// Method that dispatches one request through the framework's handler chain.
pub const TRY_HANDLE: MethodDescriptor = MethodDescriptor::new("org.noear.solon.SolonApp", "tryHandle");

/// Runtime-context flag set once the handler itself failed.
pub const EXCEPTION_FLAG: &str = "solon.exception";

/// View of the framework's request/response exchange.
pub trait HttpExchange {
    fn header(&self, name: &str) -> Option<String>;
    fn method(&self) -> &str;
    fn path(&self) -> &str;
    fn url(&self) -> String;
    /// All request headers rendered as one string.
    fn headers_display(&self) -> String;
    fn body(&self) -> Option<String>;
    /// All request parameters rendered as one string.
    fn params_display(&self) -> String;
    fn status(&self) -> u16;
    /// Error recorded on the exchange by the framework's error handling.
    fn error(&self) -> Option<&(dyn StdError + 'static)>;
}

pub struct HttpEntryInterceptor {
    manager: Arc<ContextManager>,
    config: HttpPluginConfig,
}

impl HttpEntryInterceptor {
    pub fn new(manager: Arc<ContextManager>, config: HttpPluginConfig) -> Self {
        Self { manager, config }
    }

    fn before(&self, unit: ExecutionUnitId, exchange: &dyn HttpExchange) {
        let mut carrier = self.manager.new_carrier();
        let mut items = carrier.items();
        while items.has_next() {
            let Some(mut item) = items.next_item() else {
                break;
            };
            let value = exchange.header(item.head_key());
            item.set_head_value(value.as_deref());
        }

        let operation_name = format!("Solon:{}:{}", exchange.method(), exchange.path());
        self.manager
            .create_entry_span(unit, operation_name, Some(&carrier));

        // Host accessors may re-enter the manager, so read them all before
        // taking the span.
        let url = exchange.url();
        let method = exchange.method().to_string();
        let headers = LengthThreshold::new(self.config.headers_length_threshold);
        let headers_text = (!headers.is_disabled()).then(|| exchange.headers_display());
        let body = LengthThreshold::new(self.config.body_length_threshold);
        let body_text = if body.is_disabled() {
            None
        } else {
            exchange.body().filter(|b| !b.trim().is_empty())
        };
        let params = LengthThreshold::new(self.config.params_length_threshold);
        let params_text = (!params.is_disabled()).then(|| exchange.params_display());

        let tagged = self.manager.active_span(unit, |span| {
            span.set_component(Component::SOLON_MVC);
            span.set_layer(SpanLayer::Http);
            span.tag(TagKey::URL, url);
            span.tag(TagKey::HTTP_METHOD, method);
            if let Some(text) = &headers_text {
                span.tag_with_threshold(TagKey::HTTP_HEADERS, text, headers);
            }
            if let Some(text) = &body_text {
                span.tag_with_threshold(TagKey::HTTP_BODY, text, body);
            }
            if let Some(text) = &params_text {
                span.tag_with_threshold(TagKey::HTTP_PARAMS, text, params);
            }
        });
        if let Err(e) = tagged {
            warn!(unit = %unit, error = %e, "Entry span not tagged");
        }
    }

    fn on_exception(&self, unit: ExecutionUnitId, error: &(dyn StdError + 'static)) {
        let recorded = self.manager.active_span(unit, |span| {
            span.error_occurred();
            span.log_error(error);
        });
        match recorded {
            Ok(()) => self
                .manager
                .with_runtime_context(unit, |runtime| runtime.put(EXCEPTION_FLAG, true)),
            Err(e) => warn!(unit = %unit, error = %e, "Handler error not recorded"),
        }
    }

    fn after(&self, unit: ExecutionUnitId, exchange: &dyn HttpExchange) {
        let status = exchange.status();
        let error = exchange.error();
        let raised = self.config.after_exception_handling
            && self
                .manager
                .with_runtime_context(unit, |runtime| runtime.contains(EXCEPTION_FLAG));

        let tagged = self.manager.active_span(unit, |span| {
            if self.config.after_exception_handling {
                span.tag(TagKey::HTTP_STATUS_CODE, status.to_string());
                if let Some(error) = error {
                    if status != 200 && !raised {
                        span.error_occurred();
                        span.log_error(error);
                    }
                }
            } else {
                let code = if error.is_some() { 500 } else { status };
                span.tag(TagKey::HTTP_STATUS_CODE, code.to_string());
            }
        });
        if let Err(e) = tagged {
            warn!(unit = %unit, error = %e, "Status code not tagged");
        }
        self.manager.stop_span(unit);
    }
}

impl Interceptor for HttpEntryInterceptor {
    type Target = ();
    type Args = dyn HttpExchange;
    type Output = ();

    fn intercept(&self, call: &Invocation<'_, (), dyn HttpExchange>, phase: CallPhase<'_, ()>) {
        let unit = call.unit();
        match phase {
            CallPhase::Before => self.before(unit, call.args),
            CallPhase::Exception(error) => self.on_exception(unit, error),
            CallPhase::After(_) => self.after(unit, call.args),
        }
    }
}
