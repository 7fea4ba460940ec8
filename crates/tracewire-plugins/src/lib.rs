//! Framework interceptors built on the Tracewire tracing engine.

pub mod http;
pub mod probe;
pub mod redis;
pub mod reflect;

#[cfg(test)]
mod testing;

pub use http::{EXCEPTION_FLAG, HttpEntryInterceptor, HttpExchange};
pub use probe::CapabilityProbe;
pub use redis::{ConnectionManagerInterceptor, PeerAware, Topology, resolve_peer};
pub use reflect::{FieldValue, Introspect, ObjectValue, ProbeError};

use tracewire_trace::{Component, MethodDescriptor};

/// Where a built-in plugin hooks into its host library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDefine {
    pub name: &'static str,
    pub component: Component,
    pub method: MethodDescriptor,
}

/// All built-in plugins.
pub fn builtin_plugins() -> Vec<PluginDefine> {
    vec![
        PluginDefine {
            name: "solon-2.x",
            component: Component::SOLON_MVC,
            method: http::TRY_HANDLE,
        },
        PluginDefine {
            name: "redisson-3.x",
            component: Component::REDISSON,
            method: redis::CREATE_CLIENT,
        },
    ]
}

/// Get a built-in plugin by name.
pub fn get_builtin_plugin(name: &str) -> Option<PluginDefine> {
    builtin_plugins().into_iter().find(|p| p.name == name)
}
