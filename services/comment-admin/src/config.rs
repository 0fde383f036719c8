use anyhow::Result;
use config::{Config, File};
use content_kit::config::{DatabaseConfig, ObservabilityConfig, RetrySettings};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentAdminConfig {
    pub database: DatabaseConfig,
    pub retry: RetrySettings,
    pub observability: ObservabilityConfig,
}

/// File source (optional) layered with `COMMENT_ADMIN__*` environment overrides.
pub fn load_config(path: &str) -> Result<CommentAdminConfig> {
    let config = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("COMMENT_ADMIN")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("database.hosts")
                .try_parsing(true),
        )
        .build()?;

    let config: CommentAdminConfig = config.try_deserialize()?;
    config.database.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config("does/not/exist.yaml").unwrap();
        assert_eq!(config.database.port, 9042);
        assert_eq!(config.retry, RetrySettings::default());
    }
}
