mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{LogSettings, ServerSettings, SessionSettings, Settings, StorageSettings};

/// Loads the configuration from `config/default` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from an optional file plus environment variables.
///
/// Environment variables use the `CHATWIRE_` prefix and `__` between section
/// and key (`CHATWIRE_SERVER__WS_PORT`). A bare `PORT` overrides the HTTP port.
/// Missing values fall back to `Settings::default()`.
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let port = std::env::var("PORT").ok();

    let config = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix("CHATWIRE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("server.http_port", port)?
        .build()?;

    config.try_deserialize()
}
