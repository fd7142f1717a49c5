use crate::worker::task::TaskResult;
use async_trait::async_trait;

/// Receives every task result as soon as a worker records it
#[async_trait]
pub trait ResultSink: Send + Sync + 'static {
    async fn on_result(&self, result: &TaskResult);
}

/// Sink that forwards results into a tokio channel
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<TaskResult>,
}

impl ChannelSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<TaskResult>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ResultSink for ChannelSink {
    async fn on_result(&self, result: &TaskResult) {
        let _ = self.tx.send(result.clone());
    }
}
