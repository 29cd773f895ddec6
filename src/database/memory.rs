//! 进程内存储，供测试使用，语义与 Postgres 实现保持一致。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Artwork, ArtworkStore, Portfolio, PortfolioStore, StoreError, User, UserStore, ViewEvent,
    ViewStore,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    artworks: Vec<Artwork>,
    views: Vec<ViewEvent>,
    portfolios: Vec<Portfolio>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保存的浏览记录数
    pub async fn view_count(&self) -> usize {
        self.tables.read().await.views.len()
    }
}

fn newest_first<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.email == user.email || u.slug == user.slug)
        {
            return Err(StoreError::Conflict("email or slug already exists".into()));
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_full_name(&self, full_name: &str) -> Result<Option<User>, StoreError> {
        let wanted = full_name.to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.full_name.to_lowercase() == wanted)
            .cloned())
    }
}

#[async_trait]
impl ArtworkStore for MemoryStore {
    async fn insert_artwork(&self, artwork: &Artwork) -> Result<(), StoreError> {
        self.tables.write().await.artworks.push(artwork.clone());
        Ok(())
    }

    async fn list_public_artworks(&self) -> Result<Vec<Artwork>, StoreError> {
        let tables = self.tables.read().await;
        let artworks = tables
            .artworks
            .iter()
            .filter(|a| a.is_public)
            .cloned()
            .collect();
        Ok(newest_first(artworks, |a| a.created_at))
    }

    async fn find_public_artwork(&self, id: Uuid) -> Result<Option<Artwork>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .artworks
            .iter()
            .find(|a| a.id == id && a.is_public)
            .cloned())
    }

    async fn list_artworks_by_owner(
        &self,
        owner: Uuid,
        public_only: bool,
    ) -> Result<Vec<Artwork>, StoreError> {
        let tables = self.tables.read().await;
        let artworks = tables
            .artworks
            .iter()
            .filter(|a| a.user_id == owner && (a.is_public || !public_only))
            .cloned()
            .collect();
        Ok(newest_first(artworks, |a| a.created_at))
    }

    async fn find_owned_artwork(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Artwork>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .artworks
            .iter()
            .find(|a| a.id == id && a.user_id == owner)
            .cloned())
    }

    async fn delete_artwork(&self, id: Uuid, owner: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.artworks.len();
        tables
            .artworks
            .retain(|a| !(a.id == id && a.user_id == owner));
        Ok(tables.artworks.len() < before)
    }

    async fn increment_artwork_views(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(artwork) = tables.artworks.iter_mut().find(|a| a.id == id) {
            artwork.views += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl ViewStore for MemoryStore {
    async fn insert_view(&self, view: &ViewEvent) -> Result<(), StoreError> {
        self.tables.write().await.views.push(view.clone());
        Ok(())
    }

    async fn list_views_for_owner(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ViewEvent>, StoreError> {
        let tables = self.tables.read().await;
        let owned: Vec<Uuid> = tables
            .artworks
            .iter()
            .filter(|a| a.user_id == owner)
            .map(|a| a.id)
            .collect();
        Ok(tables
            .views
            .iter()
            .filter(|v| owned.contains(&v.artwork_id))
            .filter(|v| since.is_none_or(|since| v.created_at >= since))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PortfolioStore for MemoryStore {
    async fn insert_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        self.tables.write().await.portfolios.push(portfolio.clone());
        Ok(())
    }

    async fn list_portfolios_by_owner(&self, owner: Uuid) -> Result<Vec<Portfolio>, StoreError> {
        let tables = self.tables.read().await;
        let portfolios = tables
            .portfolios
            .iter()
            .filter(|p| p.user_id == owner)
            .cloned()
            .collect();
        Ok(newest_first(portfolios, |p| p.created_at))
    }

    async fn find_portfolio(&self, id: Uuid) -> Result<Option<Portfolio>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.portfolios.iter().find(|p| p.id == id).cloned())
    }

    async fn increment_portfolio_views(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(portfolio) = tables.portfolios.iter_mut().find(|p| p.id == id) {
            portfolio.views += 1;
        }
        Ok(())
    }
}
