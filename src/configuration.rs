use config::builder::{ConfigBuilder, DefaultState};

use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Run on the in-process store instead of Postgres. State is lost on exit.
    #[serde(default)]
    pub in_memory_store: bool,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// The server without a database, for creating one.
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT and refresh token settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub access_token_expiry: i64,   // seconds (reference: 3600)
    pub refresh_token_expiry: i64,  // seconds (reference: 5184000, 60 days)
    /// Clock-skew tolerance applied to access token expiry
    #[serde(default)]
    pub leeway_seconds: i64,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct SessionSettings {
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// How long revoked or expired refresh tokens are kept before deletion
    #[serde(default = "default_cleanup_retention")]
    pub cleanup_retention_seconds: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            password_hash_cost: default_password_hash_cost(),
            cleanup_interval_seconds: default_cleanup_interval(),
            cleanup_retention_seconds: default_cleanup_retention(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_password_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_cleanup_retention() -> i64 {
    7 * 24 * 3600
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP_`-prefixed environment variables, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    build_settings(
        config::Config::builder()
            .add_source(config::File::with_name("configuration").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            ),
    )
}

fn build_settings(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let settings = builder
        .build()
        .and_then(|c| c.try_deserialize::<Settings>())
        .map_err(|e| match e {
            config::ConfigError::NotFound(key) => ConfigError::MissingRequired(key),
            other => ConfigError::InvalidValue(other.to_string()),
        })?;

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }
        if self.jwt.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }
        if self.jwt.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.refresh_token_expiry must be positive".to_string(),
            ));
        }
        if self.jwt.leeway_seconds < 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.leeway_seconds must not be negative".to_string(),
            ));
        }
        if !(4..=31).contains(&self.session.password_hash_cost) {
            return Err(ConfigError::InvalidValue(
                "session.password_hash_cost must be between 4 and 31".to_string(),
            ));
        }
        Ok(())
    }
}
