use anyhow::Result;
use config::Config;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Timezone identifier applied to floating and date-valued times.
    pub default_timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub limit: u32,
    pub delay_us: u64,
}

impl RetryConfig {
    /// ## Summary
    /// Returns the retry delay as a `Duration`.
    #[must_use]
    pub const fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.delay_us)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `.env` file and environment variables into a `Settings`.
    /// Environment variables take precedence over `.env` file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Ok(Config::builder()
            .set_default("session.default_timezone", "UTC")?
            .set_default(
                "retry.limit",
                i64::from(crate::constants::BUSY_RETRY_LIMIT),
            )?
            .set_default("retry.delay_us", 500)?
            .set_default("logging.level", "debug")?
            // Env file
            .add_source(
                config::Environment::default()
                    .convert_case(config::Case::Snake)
                    .separator("_")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            // TOML file
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    tracing::debug!(
        default_timezone = %settings.session.default_timezone,
        retry_limit = settings.retry.limit,
        "configuration loaded"
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::load().expect("defaults should deserialize");
        assert_eq!(settings.session.default_timezone, "UTC");
        assert_eq!(settings.retry.limit, 10);
        assert_eq!(settings.retry.delay(), std::time::Duration::from_micros(500));
    }
}
