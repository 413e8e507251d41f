#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log_level: String,
    pub worker_count: usize,
    /// Queues each worker serves, in claim order.
    pub queues: Vec<String>,
    pub poll_interval_secs: u64,
    pub lease_secs: i64,
    pub handler_timeout_secs: u64,
    pub request_timeout_secs: i64,
    pub sweep_interval_secs: u64,
    pub max_retries: i64,
    pub retry_delay_secs: i64,
    pub history_keep: i64,
    pub critical_patterns: Vec<String>,
    pub high_patterns: Vec<String>,
    pub low_patterns: Vec<String>,
    pub safe_patterns: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_or("WARDEN_DATABASE_URL", "sqlite://warden.db");
        let log_level = env_or("WARDEN_LOG_LEVEL", "info");

        let worker_count: usize = env_or("WARDEN_WORKER_COUNT", "4")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_WORKER_COUNT: {e}"))?;

        let queues = env_list("WARDEN_QUEUES");
        let queues = if queues.is_empty() {
            vec!["execution".to_string(), "notifications".to_string()]
        } else {
            queues
        };

        let poll_interval_secs: u64 = env_or("WARDEN_POLL_INTERVAL_SECS", "1")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_POLL_INTERVAL_SECS: {e}"))?;

        let lease_secs: i64 = env_or("WARDEN_LEASE_SECS", "60")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_LEASE_SECS: {e}"))?;

        let handler_timeout_secs: u64 = env_or("WARDEN_HANDLER_TIMEOUT_SECS", "30")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_HANDLER_TIMEOUT_SECS: {e}"))?;

        let request_timeout_secs: i64 = env_or("WARDEN_REQUEST_TIMEOUT_SECS", "300")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_REQUEST_TIMEOUT_SECS: {e}"))?;

        let sweep_interval_secs: u64 = env_or("WARDEN_SWEEP_INTERVAL_SECS", "30")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_SWEEP_INTERVAL_SECS: {e}"))?;

        let max_retries: i64 = env_or("WARDEN_MAX_RETRIES", "3")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_MAX_RETRIES: {e}"))?;

        let retry_delay_secs: i64 = env_or("WARDEN_RETRY_DELAY_SECS", "30")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_RETRY_DELAY_SECS: {e}"))?;

        let history_keep: i64 = env_or("WARDEN_HISTORY_KEEP", "1000")
            .parse()
            .map_err(|e| format!("Invalid WARDEN_HISTORY_KEEP: {e}"))?;

        let critical_patterns =
            env_list_or("WARDEN_CRITICAL_PATTERNS", Self::default_critical_patterns);
        let high_patterns = env_list_or("WARDEN_HIGH_PATTERNS", Self::default_high_patterns);
        let low_patterns = env_list_or("WARDEN_LOW_PATTERNS", Self::default_low_patterns);
        let safe_patterns = env_list_or("WARDEN_SAFE_PATTERNS", Self::default_safe_patterns);

        Ok(Config {
            database_url,
            log_level,
            worker_count,
            queues,
            poll_interval_secs,
            lease_secs,
            handler_timeout_secs,
            request_timeout_secs,
            sweep_interval_secs,
            max_retries,
            retry_delay_secs,
            history_keep,
            critical_patterns,
            high_patterns,
            low_patterns,
            safe_patterns,
        })
    }

    /// Destructive or irreversible operations. Never auto-approved.
    pub fn default_critical_patterns() -> Vec<String> {
        to_strings(&[
            r"\brm\s+-[a-zA-Z]*[rf]",
            r"\bmkfs",
            r"\bdd\s+if=",
            r"\b(shutdown|reboot|halt|poweroff)\b",
            r">\s*/dev/sd",
            r"\bDROP\s+(TABLE|DATABASE)\b",
            r"git\s+push\s+.*--force",
        ])
    }

    /// Network-mutating or dependency-installing operations.
    pub fn default_high_patterns() -> Vec<String> {
        to_strings(&[
            r"curl[^|]*\|\s*(sh|bash)",
            r"\bwget\b",
            r"\bpip3?\s+install\b",
            r"\bnpm\s+install\b",
            r"\bcargo\s+install\b",
            r"\bapt(-get)?\s+install\b",
            r"\bsystemctl\b",
            r"\biptables\b",
            r"\bchmod\s+777\b",
        ])
    }

    /// Read-only status operations.
    pub fn default_low_patterns() -> Vec<String> {
        to_strings(&[
            r"^(ls|cat|head|tail|grep|find|echo|pwd|whoami|df|du|ps|uptime|date)\b",
            r"^git\s+(status|log|diff|branch|show)\b",
        ])
    }

    /// Allow-list consulted for auto-approval. Deliberately its own list
    /// rather than an alias of the low tier: loosening risk scoring must not
    /// silently widen auto-approval.
    pub fn default_safe_patterns() -> Vec<String> {
        to_strings(&[
            r"^(ls|cat|head|tail|grep|echo|pwd|whoami|df|du|ps|uptime|date)\b",
            r"^git\s+(status|log|diff|branch|show)\b",
        ])
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_list_or(key: &str, default: fn() -> Vec<String>) -> Vec<String> {
    let list = env_list(key);
    if list.is_empty() { default() } else { list }
}

fn to_strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}
