use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Every section falls back to its `Default` when absent, so a partial
/// configuration file or a handful of environment variables is enough.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub session: SessionSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// The request/response gateway and the subscription endpoint listen on
/// separate ports of the same host.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub http_port: u16,
    pub ws_port: u16,
    pub ws_path: String,
}

impl ServerSettings {
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }
}

/// Where and how the message log is stored.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub path: String,
    /// Flush the log to disk before `append` returns.
    pub flush_on_append: bool,
}

/// Per-connection limits for subscription sessions.
///
/// `buffer_capacity` bounds each operation's delivery buffer (oldest events are
/// dropped past it); `outbound_capacity` bounds the frames queued for the socket writer.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionSettings {
    pub buffer_capacity: usize,
    pub outbound_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 5005,
            ws_port: 5006,
            ws_path: "/graphql".to_string(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: "chatwire_db".to_string(),
            flush_on_append: false,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 64,
            outbound_capacity: 32,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
