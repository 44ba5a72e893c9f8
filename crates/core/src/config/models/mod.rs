pub mod app_config;
pub mod dispatcher;
pub mod observability;

pub use app_config::{AppConfig, ENV_PREFIX};
pub use dispatcher::{
    DependencyConfig, DispatcherConfig, InstancesConfig, JobsConfig, SELECTION_STRATEGIES,
};
pub use observability::{ObservabilityConfig, StateConfig};
