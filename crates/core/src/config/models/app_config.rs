use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    dispatcher::{DependencyConfig, DispatcherConfig, InstancesConfig, JobsConfig},
    observability::{ObservabilityConfig, StateConfig},
};

/// 环境变量前缀，例如 `ORCHESTRATOR_DISPATCHER__SCHEDULE_INTERVAL_SECONDS=2`
pub const ENV_PREFIX: &str = "ORCHESTRATOR";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/orchestrator.toml",
    "orchestrator.toml",
    "/etc/orchestrator/config.toml",
];

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub dependency: DependencyConfig,
    pub jobs: JobsConfig,
    pub instances: InstancesConfig,
    pub state: StateConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序:
    /// 1. 代码中的默认值
    /// 2. 配置文件 (TOML)，未指定路径时依次尝试默认路径
    /// 3. 环境变量覆盖 (前缀: ORCHESTRATOR_，层级分隔符: __)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 序列化为TOML字符串，用于输出生效配置
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate().context("调度器配置验证失败")?;
        self.dependency.validate().context("依赖配置验证失败")?;
        self.jobs.validate().context("作业配置验证失败")?;
        self.instances.validate().context("实例配置验证失败")?;
        self.state.validate().context("状态快照配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.selection_strategy, "least_loaded");
        assert_eq!(config.dependency.inventory_freshness_seconds, 86_400);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [dispatcher]
            schedule_interval_seconds = 2
            selection_strategy = "round_robin"

            [dependency]
            inventory_freshness_seconds = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatcher.schedule_interval_seconds, 2);
        assert_eq!(config.dispatcher.selection_strategy, "round_robin");
        assert_eq!(config.dispatcher.max_dispatches_per_pass, 100);
        assert_eq!(config.dependency.inventory_freshness_seconds, 3600);
        assert_eq!(config.dependency.project_freshness_seconds, 86_400);
    }

    #[test]
    fn test_invalid_strategy_is_rejected() {
        let err = AppConfig::from_toml(
            r#"
            [dispatcher]
            selection_strategy = "random"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("无效的实例选择策略"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [instances]
            heartbeat_window_seconds = 45
            local_instance_id = "node-a"

            [observability]
            log_format = "json"
            "#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.instances.heartbeat_window_seconds, 45);
        assert_eq!(config.instances.local_instance_id.as_deref(), Some("node-a"));
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = AppConfig::load(Some("/nonexistent/orchestrator.toml")).unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }

    #[test]
    fn test_to_toml_roundtrips_through_loader() {
        let mut config = AppConfig::default();
        config.jobs.default_timeout_seconds = 900;
        let rendered = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.jobs.default_timeout_seconds, 900);
    }
}
