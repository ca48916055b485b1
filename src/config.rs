use std::env;
use std::time::Duration;

/// Process configuration, read from the environment with defaults
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// SQLite database path
    pub db_path: String,
    /// Root of the chunk datasets
    pub data_root: String,
    /// Root of the train/test artifacts
    pub results_root: String,
    /// Interpreter used by the code runner
    pub python_bin: String,
    /// Scratch directory for runner scripts
    pub run_dir: String,
    /// Wall-clock limit for one code run
    pub run_timeout: Duration,
    /// Seeded login credentials
    pub admin_user: String,
    pub admin_pass: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        let timeout_secs = var_or("SW_RUN_TIMEOUT_SECS", "300")
            .parse::<u64>()
            .unwrap_or(300);
        Self {
            bind_addr: var_or("SW_BIND_ADDR", "127.0.0.1:8080"),
            db_path: var_or("SW_DB_PATH", "./data/workbench.db"),
            data_root: var_or("SW_DATA_ROOT", "./data/chunks"),
            results_root: var_or("SW_RESULTS_ROOT", "./data/results"),
            python_bin: var_or("SW_PYTHON_BIN", "python3"),
            run_dir: var_or("SW_RUN_DIR", "./data/run"),
            run_timeout: Duration::from_secs(timeout_secs),
            admin_user: var_or("SW_ADMIN_USER", "admin"),
            admin_pass: var_or("SW_ADMIN_PASS", "admin"),
        }
    }
}
