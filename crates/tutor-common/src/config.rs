use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {var} has an invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Process-wide configuration, loaded once from the environment at startup
/// (see §6 of the design doc for the recognized variable set). Every field
/// has a default so the server runs out of the box with no environment at
/// all, the same way the reference server's `Config` falls back to built-in
/// defaults for anything not present on disk.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` means auth is disabled; the first `auth` message is still
    /// required on the wire, but its token is not checked.
    pub tutor_password: Option<String>,
    pub park_ttl: Duration,
    pub park_capacity: usize,
    pub exec_cpu_seconds: u64,
    pub exec_memory_mb: u64,
    pub sessions_dir: PathBuf,
    pub workspaces_dir: PathBuf,
    pub problems_dir: PathBuf,
    pub bind_addr: String,
    /// Command used to launch the tutor backend subprocess for each session.
    pub tutor_backend_cmd: String,
    pub tutor_backend_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tutor_password: None,
            park_ttl: Duration::from_secs(300),
            park_capacity: 32,
            exec_cpu_seconds: 10,
            exec_memory_mb: 512,
            sessions_dir: PathBuf::from("./sessions"),
            workspaces_dir: PathBuf::from("./workspaces"),
            problems_dir: PathBuf::from("./problems"),
            bind_addr: "127.0.0.1:8787".to_string(),
            tutor_backend_cmd: "python3".to_string(),
            tutor_backend_args: vec!["-u".to_string(), "tutor_backend.py".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from the process environment, applying the
    /// defaults in `Default` for anything unset. Rejects nonsensical values
    /// (e.g. a zero TTL or capacity) rather than silently accepting them.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("TUTOR_PASSWORD") {
            if !v.is_empty() {
                config.tutor_password = Some(v);
            }
        }
        if let Some(secs) = parse_env_u64("PARK_TTL_SECONDS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "PARK_TTL_SECONDS",
                    value: secs.to_string(),
                    reason: "must be greater than zero",
                });
            }
            config.park_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = parse_env_u64("PARK_CAPACITY")? {
            if n == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "PARK_CAPACITY",
                    value: n.to_string(),
                    reason: "must be greater than zero",
                });
            }
            config.park_capacity = n as usize;
        }
        if let Some(secs) = parse_env_u64("EXEC_CPU_SECONDS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "EXEC_CPU_SECONDS",
                    value: secs.to_string(),
                    reason: "must be greater than zero",
                });
            }
            config.exec_cpu_seconds = secs;
        }
        if let Some(mb) = parse_env_u64("EXEC_MEMORY_MB")? {
            if mb == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "EXEC_MEMORY_MB",
                    value: mb.to_string(),
                    reason: "must be greater than zero",
                });
            }
            config.exec_memory_mb = mb;
        }
        if let Ok(v) = std::env::var("SESSIONS_DIR") {
            config.sessions_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("WORKSPACES_DIR") {
            config.workspaces_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PROBLEMS_DIR") {
            config.problems_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var("TUTOR_BACKEND_CMD") {
            config.tutor_backend_cmd = v;
        }
        if let Ok(v) = std::env::var("TUTOR_BACKEND_ARGS") {
            config.tutor_backend_args = v.split_whitespace().map(str::to_string).collect();
        }

        Ok(config)
    }
}

fn parse_env_u64(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var,
                value,
                reason: "expected a non-negative integer",
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "TUTOR_PASSWORD",
            "PARK_TTL_SECONDS",
            "PARK_CAPACITY",
            "EXEC_CPU_SECONDS",
            "EXEC_MEMORY_MB",
            "SESSIONS_DIR",
            "WORKSPACES_DIR",
            "PROBLEMS_DIR",
            "BIND_ADDR",
            "TUTOR_BACKEND_CMD",
            "TUTOR_BACKEND_ARGS",
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn defaults_when_env_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = Config::load().unwrap();
        assert!(config.tutor_password.is_none());
        assert_eq!(config.park_ttl, Duration::from_secs(300));
        assert_eq!(config.park_capacity, 32);
        assert_eq!(config.bind_addr, "127.0.0.1:8787");
    }

    #[test]
    fn rejects_zero_ttl() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("PARK_TTL_SECONDS", "0") };
        let err = Config::load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "PARK_TTL_SECONDS", .. }));
        clear_env();
    }

    #[test]
    fn rejects_garbage_integer() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe { std::env::set_var("EXEC_MEMORY_MB", "lots") };
        let err = Config::load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "EXEC_MEMORY_MB", .. }));
        clear_env();
    }

    #[test]
    fn picks_up_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("TUTOR_PASSWORD", "hunter2");
            std::env::set_var("PARK_CAPACITY", "8");
        }
        let config = Config::load().unwrap();
        assert_eq!(config.tutor_password.as_deref(), Some("hunter2"));
        assert_eq!(config.park_capacity, 8);
        clear_env();
    }
}
