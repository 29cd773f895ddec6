use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// 单个路由的限流参数：每秒补充的令牌数与桶容量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteLimit {
    pub refill_rate: f64,
    pub capacity: u32,
}

impl RouteLimit {
    pub const fn new(refill_rate: f64, capacity: u32) -> Self {
        Self {
            refill_rate,
            capacity,
        }
    }

    /// 解析 `<rate>/<capacity>` 格式，例如 `0.2/1`
    pub fn parse(raw: &str) -> Option<Self> {
        let (rate, capacity) = raw.split_once('/')?;
        let refill_rate = rate.trim().parse::<f64>().ok()?;
        let capacity = capacity.trim().parse::<u32>().ok()?;
        Some(Self::new(refill_rate, capacity))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteLimits {
    pub upload: RouteLimit,
    pub public_list: RouteLimit,
    pub single_item: RouteLimit,
    pub mine: RouteLimit,
    pub delete: RouteLimit,
    pub auth: RouteLimit,
    pub analytics: RouteLimit,
    pub log_view: RouteLimit,
}

impl Default for RouteLimits {
    fn default() -> Self {
        Self {
            upload: RouteLimit::new(0.2, 1),
            public_list: RouteLimit::new(2.0, 5),
            single_item: RouteLimit::new(1.0, 5),
            mine: RouteLimit::new(1.0, 3),
            delete: RouteLimit::new(0.3, 1),
            auth: RouteLimit::new(0.5, 2),
            analytics: RouteLimit::new(5.0, 10),
            log_view: RouteLimit::new(10.0, 20),
        }
    }
}

impl RouteLimits {
    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let slots: [(&str, &mut RouteLimit); 8] = [
            ("RATE_LIMIT_UPLOAD", &mut self.upload),
            ("RATE_LIMIT_PUBLIC_LIST", &mut self.public_list),
            ("RATE_LIMIT_SINGLE_ITEM", &mut self.single_item),
            ("RATE_LIMIT_MINE", &mut self.mine),
            ("RATE_LIMIT_DELETE", &mut self.delete),
            ("RATE_LIMIT_AUTH", &mut self.auth),
            ("RATE_LIMIT_ANALYTICS", &mut self.analytics),
            ("RATE_LIMIT_LOG_VIEW", &mut self.log_view),
        ];
        for (key, slot) in slots {
            if let Some(raw) = lookup(key) {
                *slot = RouteLimit::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                    key: key.to_string(),
                    reason: format!("expected <rate>/<capacity>, got {raw:?}"),
                })?;
            }
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub cloudinary: CloudinaryConfig,
    pub upload_folder: String,
    pub max_upload_mb: u64,
    pub bcrypt_cost: u32,
    pub cors_origins: Vec<String>,
    pub rate_limits: RouteLimits,
}

// token 有效期上限：十年
const MAX_JWT_EXPIRATION_HOURS: u64 = 10 * 365 * 24;
// 单个上传文件最大 1 GiB
const MAX_UPLOAD_MB_LIMIT: u64 = 1024;
// bcrypt 接受的 cost 范围
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3001,https://artwork-phi-swart.vercel.app";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源构建配置，便于测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let jwt_expiration_hours = match lookup("JWT_EXPIRATION") {
            Some(raw) => parse_number::<u64>("JWT_EXPIRATION", raw.trim_end_matches('h'))?,
            None => 7 * 24,
        };
        let jwt_expiration_secs = jwt_expiration_hours
            .checked_mul(3600)
            .filter(|_| (1..=MAX_JWT_EXPIRATION_HOURS).contains(&jwt_expiration_hours))
            .ok_or_else(|| ConfigError::Invalid {
                key: "JWT_EXPIRATION".to_string(),
                reason: format!("expected 1..={MAX_JWT_EXPIRATION_HOURS} hours"),
            })?;
        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => parse_number::<u16>("SERVER_PORT", &raw)?,
            None => 5005,
        };
        let max_upload_mb = match lookup("MAX_UPLOAD_MB") {
            Some(raw) => parse_number::<u64>("MAX_UPLOAD_MB", &raw)?,
            None => 10,
        };
        if !(1..=MAX_UPLOAD_MB_LIMIT).contains(&max_upload_mb) {
            return Err(ConfigError::Invalid {
                key: "MAX_UPLOAD_MB".to_string(),
                reason: format!("expected 1..={MAX_UPLOAD_MB_LIMIT}"),
            });
        }
        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(raw) => parse_number::<u32>("BCRYPT_COST", &raw)?,
            None => bcrypt::DEFAULT_COST,
        };
        if !BCRYPT_COST_RANGE.contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST".to_string(),
                reason: format!(
                    "expected {}..={}",
                    BCRYPT_COST_RANGE.start(),
                    BCRYPT_COST_RANGE.end()
                ),
            });
        }
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_secs,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port,
            cloudinary: CloudinaryConfig {
                cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_API_SECRET")?,
            },
            upload_folder: lookup("UPLOAD_FOLDER").unwrap_or_else(|| "artfolio".into()),
            max_upload_mb,
            bcrypt_cost,
            cors_origins,
            rate_limits: RouteLimits::default().apply_overrides(&lookup)?,
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("not a number: {raw:?}"),
    })
}
