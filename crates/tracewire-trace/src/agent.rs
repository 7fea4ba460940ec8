//! Agent bootstrap: wires the context manager to the reporting pipeline.

use crate::manager::ContextManager;
use crate::report::{ChannelSink, SegmentExporter, spawn_reporter};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracewire_core::config::AgentConfig;
use tracing::info;

pub struct TracingAgent {
    manager: Arc<ContextManager>,
    sink: Arc<ChannelSink>,
    reporter: JoinHandle<u64>,
    shutdown: oneshot::Sender<()>,
}

impl TracingAgent {
    /// Start the agent. Must be called from within a tokio runtime.
    pub fn start(config: &AgentConfig, exporter: Arc<dyn SegmentExporter>) -> Self {
        let (sink, rx) = ChannelSink::bounded(config.reporter.queue_capacity);
        let sink = Arc::new(sink);
        let manager = Arc::new(ContextManager::new(config, sink.clone()));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let reporter = spawn_reporter(rx, exporter, shutdown_rx);

        info!(
            service = %config.service_name,
            instance = %config.instance_name,
            queue_capacity = config.reporter.queue_capacity,
            "Tracing agent started"
        );

        Self {
            manager,
            sink,
            reporter,
            shutdown,
        }
    }

    pub fn manager(&self) -> Arc<ContextManager> {
        self.manager.clone()
    }

    pub fn dropped_segments(&self) -> u64 {
        self.sink.dropped()
    }

    /// Flush queued segments and stop the reporter. Returns the export count.
    pub async fn shutdown(self) -> u64 {
        let _ = self.shutdown.send(());
        match self.reporter.await {
            Ok(exported) => exported,
            Err(e) => {
                tracing::warn!(error = %e, "Segment reporter task failed");
                0
            }
        }
    }
}
