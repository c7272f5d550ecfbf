/// Environment-driven configuration for the gateway process. Read once at
/// startup; every service struct receives its slice by value.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub server_port: u16,
    pub log_level: String,
    pub ntp: NtpConfig,
    pub redis: RedisConfig,
    pub ha: HaConfig,
}

#[derive(Clone, Debug)]
pub struct NtpConfig {
    pub server: String,
    pub backup_server: String,
    pub timeout_secs: u64,
    /// IANA timezone name used for the local rendering of timestamps.
    pub local_timezone: String,
}

#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HaConfig {
    pub url: String,
    pub token: String,
    pub cache_ttl_secs: u64,
}

impl HaConfig {
    /// Token absence puts the synchronizer in a permanent not-configured state.
    pub fn is_configured(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// HA's event endpoint, derived from the REST base URL.
    pub fn websocket_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{base}")
        };
        format!("{base}/api/websocket")
    }

    pub fn rest_url(&self, path: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            server_port: env_parse("SERVER_PORT", 8000),
            log_level: env_or("LOG_LEVEL", "info"),
            ntp: NtpConfig {
                server: env_or("NTP_SERVER", "pool.ntp.org"),
                backup_server: env_or("NTP_BACKUP_SERVER", "time.google.com"),
                timeout_secs: env_parse("NTP_TIMEOUT", 5),
                local_timezone: env_or("LOCAL_TIMEZONE", "America/Los_Angeles"),
            },
            redis: RedisConfig {
                host: env_or("REDIS_HOST", "localhost"),
                port: env_parse("REDIS_PORT", 6379),
                password: std::env::var("REDIS_PASSWORD")
                    .ok()
                    .filter(|v| !v.is_empty()),
                db: env_parse("REDIS_DB", 0),
            },
            ha: HaConfig {
                url: env_or("HA_URL", "http://ha.internal"),
                token: env_or("HA_TOKEN", ""),
                cache_ttl_secs: env_parse("HA_CACHE_TTL", 30),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
