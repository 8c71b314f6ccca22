//! 统一配置中心。
//!
//! 提供应用的全局配置管理，包括：
//! - 数据库连接
//! - HTTP 服务
//! - 限流策略
//! - 登录码 / 引用码参数
//! - 在线状态时间窗口

use serde::{Deserialize, Serialize};
use std::env;

/// 全局应用配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub login_code: LoginCodeConfig,
    pub ref_code: RefCodeConfig,
    pub presence: PresenceConfig,
}

/// 数据库配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// HTTP 服务器配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 滑动窗口限流策略（按用户）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 登录码：每用户每分钟最多申请次数。
    pub login_codes_per_minute: u32,
    /// 消息：每用户每分钟最多发送条数。
    pub messages_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_codes_per_minute: 5,
            messages_per_minute: 60,
        }
    }
}

/// 一次性登录码参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCodeConfig {
    /// 码长（不含歧义字符的大写字母+数字）。
    pub length: usize,
    /// 有效期（分钟）。
    pub ttl_minutes: i64,
}

impl Default for LoginCodeConfig {
    fn default() -> Self {
        Self {
            length: 4,
            ttl_minutes: 10,
        }
    }
}

/// 公开引用码参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefCodeConfig {
    pub length: usize,
    /// 碰撞重试上限，耗尽即报错而不是无限循环。
    pub max_attempts: u32,
}

impl Default for RefCodeConfig {
    fn default() -> Self {
        Self {
            length: 6,
            max_attempts: 32,
        }
    }
}

/// 在线状态时间窗口。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// last_seen_at 距今不超过该秒数视为在线。
    pub online_window_secs: i64,
    /// typing 标记的有效秒数，超过即自然过期。
    pub typing_window_secs: i64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            online_window_secs: 60,
            typing_window_secs: 10,
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置。
    /// DATABASE_URL 缺失时 panic，确保生产环境不会落到不安全默认值。
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .expect("DATABASE_URL environment variable is required"),
                max_connections: env_parsed("DB_MAX_CONNECTIONS", 5),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_parsed("SERVER_PORT", 8080),
            },
            rate_limit: RateLimitConfig {
                login_codes_per_minute: env_parsed("LOGIN_CODES_PER_MINUTE", 5),
                messages_per_minute: env_parsed("MESSAGES_PER_MINUTE", 60),
            },
            login_code: LoginCodeConfig {
                length: env_parsed("LOGIN_CODE_LENGTH", 4),
                ttl_minutes: env_parsed("LOGIN_CODE_TTL_MINUTES", 10),
            },
            ref_code: RefCodeConfig {
                length: env_parsed("REF_CODE_LENGTH", 6),
                max_attempts: env_parsed("REF_CODE_MAX_ATTEMPTS", 32),
            },
            presence: PresenceConfig {
                online_window_secs: env_parsed("PRESENCE_ONLINE_WINDOW_SECS", 60),
                typing_window_secs: env_parsed("PRESENCE_TYPING_WINDOW_SECS", 10),
            },
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
