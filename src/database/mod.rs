// 数据库模块
// 存储接口定义，以及 Postgres 与内存两种实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use models::{Artwork, Portfolio, User, ViewEvent};
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// 唯一约束冲突
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// email 或 slug 重复时返回 [`StoreError::Conflict`]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// 忽略大小写的全名精确匹配
    async fn find_user_by_full_name(&self, full_name: &str) -> Result<Option<User>, StoreError>;
}

/// 列表接口均按创建时间倒序返回
#[async_trait]
pub trait ArtworkStore: Send + Sync {
    async fn insert_artwork(&self, artwork: &Artwork) -> Result<(), StoreError>;
    async fn list_public_artworks(&self) -> Result<Vec<Artwork>, StoreError>;
    async fn find_public_artwork(&self, id: Uuid) -> Result<Option<Artwork>, StoreError>;
    async fn list_artworks_by_owner(
        &self,
        owner: Uuid,
        public_only: bool,
    ) -> Result<Vec<Artwork>, StoreError>;
    async fn find_owned_artwork(&self, id: Uuid, owner: Uuid)
    -> Result<Option<Artwork>, StoreError>;
    async fn delete_artwork(&self, id: Uuid, owner: Uuid) -> Result<bool, StoreError>;
    async fn increment_artwork_views(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ViewStore: Send + Sync {
    async fn insert_view(&self, view: &ViewEvent) -> Result<(), StoreError>;
    /// 属于 `owner` 的作品的浏览记录，`since` 为空时不限时间
    async fn list_views_for_owner(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ViewEvent>, StoreError>;
}

#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn insert_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError>;
    async fn list_portfolios_by_owner(&self, owner: Uuid) -> Result<Vec<Portfolio>, StoreError>;
    async fn find_portfolio(&self, id: Uuid) -> Result<Option<Portfolio>, StoreError>;
    async fn increment_portfolio_views(&self, id: Uuid) -> Result<(), StoreError>;
}

pub trait Store: UserStore + ArtworkStore + ViewStore + PortfolioStore {}

impl<T> Store for T where T: UserStore + ArtworkStore + ViewStore + PortfolioStore {}
