//! 按客户端 IP 的令牌桶限流。
//!
//! 每个路由持有自己的 [`RateLimiter`] 实例，实例内部是 `key -> ClientBucket`
//! 的注册表，由一把互斥锁保护。后台清理任务定期移除空闲超过 10 分钟的桶。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{config::RouteLimit, error::AppError};

/// 空闲超过该时长的桶会被清理
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// 清理任务的唤醒间隔
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// 浮点累加误差容忍
const TOKEN_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum LimitError {
    #[error("refill rate must be a positive finite number, got {0}")]
    InvalidRate(f64),
    #[error("capacity must be at least 1")]
    InvalidCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    RateLimited,
}

#[derive(Debug, Clone, Copy)]
struct ClientBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

pub struct RateLimiter {
    refill_rate: f64,
    capacity: f64,
    idle_timeout: Duration,
    buckets: Mutex<HashMap<String, ClientBucket>>,
}

impl RateLimiter {
    pub fn new(limit: RouteLimit) -> Result<Self, LimitError> {
        if !limit.refill_rate.is_finite() || limit.refill_rate <= 0.0 {
            return Err(LimitError::InvalidRate(limit.refill_rate));
        }
        if limit.capacity < 1 {
            return Err(LimitError::InvalidCapacity);
        }
        Ok(Self {
            refill_rate: limit.refill_rate,
            capacity: f64::from(limit.capacity),
            idle_timeout: IDLE_TIMEOUT,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    pub fn allow(&self, key: &str) -> Decision {
        self.allow_at(key, Instant::now())
    }

    /// 在给定时刻为 `key` 结算令牌并尝试消费一个
    pub fn allow_at(&self, key: &str, now: Instant) -> Decision {
        let mut buckets = self.lock();
        let bucket = buckets.entry(key.to_owned()).or_insert(ClientBucket {
            tokens: self.capacity,
            last_refill: now,
            last_seen: now,
        });

        // 调用方传入的时刻可能早于上次结算，此时不补充也不回退
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        bucket.last_refill = bucket.last_refill.max(now);

        if bucket.tokens + TOKEN_EPSILON >= 1.0 {
            bucket.tokens = (bucket.tokens - 1.0).max(0.0);
            bucket.last_seen = bucket.last_seen.max(now);
            Decision::Allowed
        } else {
            Decision::RateLimited
        }
    }

    /// 移除空闲超时的桶，返回移除数量
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= self.idle_timeout);
        before - buckets.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// 启动后台清理任务，`shutdown` 被取消时退出
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep_at(Instant::now());
                        if removed > 0 {
                            tracing::debug!("rate limiter sweep evicted {} idle clients", removed);
                        }
                    }
                }
            }
        })
    }

    // 锁中毒意味着持锁时发生了 panic；桶状态本身仍然一致，直接取回继续用
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 取 `X-Forwarded-For` 的第一个值，否则退回到连接的对端地址
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let key = client_key(req.headers(), peer);

    match limiter.allow(&key) {
        Decision::Allowed => next.run(req).await,
        Decision::RateLimited => {
            tracing::debug!("rate limited {} {} for {}", req.method(), req.uri().path(), key);
            AppError::RateLimited.into_response()
        }
    }
}
