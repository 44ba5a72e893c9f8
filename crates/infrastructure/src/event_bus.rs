use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use orchestrator_core::SchedulerResult;
use orchestrator_domain::events::{DomainEvent, EventPublisher, SchedulerEvent};

/// 默认事件缓冲区大小
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// 基于 tokio broadcast 的进程内事件总线
///
/// 订阅者处理过慢时会丢失最早的事件 (`RecvError::Lagged`)。
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<SchedulerEvent>,
}

impl BroadcastEventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventBus {
    async fn publish(&self, event: SchedulerEvent) -> SchedulerResult<()> {
        let event_type = event.event_type().to_string();
        if self.sender.send(event).is_err() {
            trace!("事件 {} 没有订阅者", event_type);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }
}
