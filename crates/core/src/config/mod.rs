//! 配置管理
//!
//! 所有组件的配置都从 `AppConfig` 显式传入，不使用全局单例。

pub mod models;

pub use models::*;
