use thiserror::Error;

/// Failure classification surfaced by an adapter's `collect` call.
///
/// Variants map 1:1 onto the "Error kinds" taxonomy: each one carries enough
/// context (collector/provider name, endpoint) to log without re-deriving it
/// at the call site.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("{collector}: configuration missing: {detail}")]
    ConfigMissing { collector: String, detail: String },

    #[error("{collector}: transport failure: {detail}")]
    Transport { collector: String, detail: String },

    #[error("{collector}: authentication failed: {detail}")]
    Auth { collector: String, detail: String },

    #[error("{collector}: rate limited: {detail}")]
    RateLimited { collector: String, detail: String },

    #[error("{collector}: remote server error: {detail}")]
    RemoteServer { collector: String, detail: String },

    #[error("{collector}: response schema mismatch: {detail}")]
    Schema { collector: String, detail: String },

    #[error("{collector}: collection cancelled")]
    Cancelled { collector: String },
}

impl CollectorError {
    pub fn collector(&self) -> &str {
        match self {
            CollectorError::ConfigMissing { collector, .. }
            | CollectorError::Transport { collector, .. }
            | CollectorError::Auth { collector, .. }
            | CollectorError::RateLimited { collector, .. }
            | CollectorError::RemoteServer { collector, .. }
            | CollectorError::Schema { collector, .. }
            | CollectorError::Cancelled { collector } => collector,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to write cache entry {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache entry {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("another instance is already running with pid {pid}")]
    AlreadyRunning { pid: i32 },

    #[error("failed to access pid file {path}: {source}")]
    PidFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache directory {path} is not usable: {source}")]
    CacheDirUnusable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
