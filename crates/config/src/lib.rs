//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 数据库连接
//! - JWT认证
//! - 服务设置

use serde::{Deserialize, Serialize};
use std::env;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 数据库配置
    pub database: DatabaseConfig,
    /// JWT认证配置
    pub jwt: JwtConfig,
    /// 服务配置
    pub server: ServerConfig,
}

/// 数据库配置
///
/// 不设置 `url` 时应用以进程内存储运行，重启后数据丢失。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub bcrypt_cost: Option<u32>,
}

impl AppConfig {
    /// 从环境变量加载配置
    /// JWT_SECRET 缺失时会 panic，确保生产环境不会落到不安全的默认密钥
    pub fn from_env() -> Self {
        Self::load(
            env::var("JWT_SECRET")
                .expect("JWT_SECRET environment variable is required for production safety"),
        )
    }

    /// 从环境变量加载配置，开发环境版本
    /// 提供不安全的默认密钥，仅用于测试和开发
    pub fn from_env_with_defaults() -> Self {
        Self::load(env::var("JWT_SECRET").unwrap_or_else(|_| {
            "dev-secret-key-not-for-production-use-minimum-32-chars".to_string()
        }))
    }

    /// 两个入口只在密钥策略上不同，其余字段读取共用这里
    fn load(jwt_secret: String) -> Self {
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok(),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(24),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
                bcrypt_cost: env::var("BCRYPT_COST").ok().and_then(|s| s.parse().ok()),
            },
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.database.url {
            if url.is_empty() {
                return Err(ConfigError::InvalidDatabaseUrl(
                    "Database URL cannot be empty".to_string(),
                ));
            }
        }

        // JWT密钥至少256位
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.jwt.expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT expiration must be positive".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        // 4 是 bcrypt 的算法下限，生产环境建议 10 以上
        if let Some(cost) = self.server.bcrypt_cost {
            if !(4..=16).contains(&cost) {
                return Err(ConfigError::InvalidServerConfig(
                    "bcrypt cost must be between 4 and 16".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本
    fn default() -> Self {
        Self::from_env_with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env_with_defaults() {
        let config = AppConfig::from_env_with_defaults();
        assert!(!config.jwt.secret.is_empty());
        assert!(config.jwt.expiration_hours > 0);
        assert!(config.server.port > 0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::from_env_with_defaults();
        assert!(config.validate().is_ok());

        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());

        config.jwt.secret = "a-sufficiently-long-secret-key-for-tests".to_string();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        config.database.max_connections = 5;
        config.server.bcrypt_cost = Some(2);
        assert!(config.validate().is_err());

        config.server.bcrypt_cost = Some(12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_database_url_means_memory_mode() {
        let config = AppConfig {
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: "a-sufficiently-long-secret-key-for-tests".to_string(),
                expiration_hours: 24,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                bcrypt_cost: None,
            },
        };
        assert!(config.validate().is_ok());
        assert!(config.database.url.is_none());
    }
}
