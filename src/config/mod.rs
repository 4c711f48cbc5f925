use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    /// 活动开始前禁止房主移除成员的时长（小时）
    pub freeze_window_hours: i64,
    /// 乐观锁冲突时的最大重试次数
    pub conflict_retry_limit: u32,
    pub completion_sweep_secs: u64,
    /// 附带副作用（聊天室同步、通知、推送）是否脱离请求异步执行
    pub detach_side_effects: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/companion".into(),
            redis_url: "redis://127.0.0.1/".into(),
            jwt_secret: "dev-secret".into(),
            jwt_expiration_secs: 24 * 3600,
            server_host: "::".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            freeze_window_hours: 5,
            conflict_retry_limit: 3,
            completion_sweep_secs: 300,
            detach_side_effects: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();
        let defaults = Config::default();

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.trim_end_matches('h').parse::<u64>().ok())
            .unwrap_or(24);

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(env::var("SERVER_PORT").ok(), defaults.server_port),
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            freeze_window_hours: parse_or(
                env::var("FREEZE_WINDOW_HOURS").ok(),
                defaults.freeze_window_hours,
            ),
            conflict_retry_limit: parse_or(
                env::var("CONFLICT_RETRY_LIMIT").ok(),
                defaults.conflict_retry_limit,
            ),
            completion_sweep_secs: parse_or(
                env::var("COMPLETION_SWEEP_SECS").ok(),
                defaults.completion_sweep_secs,
            ),
            detach_side_effects: env::var("DETACH_SIDE_EFFECTS")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.detach_side_effects),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn freeze_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.freeze_window_hours)
    }

    pub fn completion_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.completion_sweep_secs.max(1))
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
