use actix_web::cookie::SameSite;
use config::ConfigError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub cookie: CookieSettings,
    pub password: PasswordSettings,
    pub revocation: RevocationSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub max_connections: u32,
    /// Upper bound for a single store call, in seconds
    pub timeout_seconds: u64,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 1800 for 30 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
    /// Issue a new refresh token and revoke the presented one on every refresh
    pub rotate_refresh_tokens: bool,
}

/// Refresh token cookie settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct CookieSettings {
    pub name: String,
    pub secure: bool,
    pub same_site: String,
    pub path: String,
}

impl CookieSettings {
    pub fn same_site(&self) -> SameSite {
        match self.same_site.trim().to_ascii_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            _ => SameSite::Lax,
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    /// bcrypt work factor (4..=31)
    pub hash_cost: u32,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct RevocationSettings {
    pub purge_interval_seconds: u64,
}

impl Settings {
    /// Reject values that would leave the service running but broken.
    ///
    /// Token lifetimes are not checked: a zero lifetime is legal and yields
    /// tokens that are already expired.
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError::{InvalidValue, MissingRequired};

        if self.jwt.secret.trim().is_empty() {
            return Err(MissingRequired("jwt.secret".to_string()));
        }
        if self.cookie.name.trim().is_empty() {
            return Err(MissingRequired("cookie.name".to_string()));
        }
        if self.database.timeout_seconds == 0 {
            return Err(InvalidValue(
                "database.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(InvalidValue(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.revocation.purge_interval_seconds == 0 {
            return Err(InvalidValue(
                "revocation.purge_interval_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `configuration.{yaml,toml,json}` and `APP_*` environment variables.
///
/// Environment variables use `__` between nested keys, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8000)?
        .set_default("database.max_connections", 5)?
        .set_default("database.timeout_seconds", 5)?
        .set_default("jwt.access_token_expiry", 1800)?
        .set_default("jwt.refresh_token_expiry", 604800)?
        .set_default("jwt.issuer", "user-accounts")?
        .set_default("jwt.rotate_refresh_tokens", true)?
        .set_default("cookie.name", "refresh_token")?
        .set_default("cookie.secure", false)?
        .set_default("cookie.same_site", "lax")?
        .set_default("cookie.path", "/")?
        .set_default("password.hash_cost", 12)?
        .set_default("revocation.purge_interval_seconds", 3600)?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
