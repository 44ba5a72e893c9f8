pub mod channel_launcher;
pub mod credential_resolver;
pub mod event_bus;
pub mod in_memory;
pub mod observability;
pub mod snapshot_store;

pub use channel_launcher::{ChannelLauncher, LauncherCommand};
pub use credential_resolver::ReferenceCredentialResolver;
pub use event_bus::BroadcastEventBus;
pub use in_memory::*;
pub use observability::{MetricsCollector, StructuredLogger};
pub use snapshot_store::SnapshotStore;
