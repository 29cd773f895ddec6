//! Postgres 存储实现。
//!
//! 依赖的表：`users`、`artworks`、`view_events`、`portfolios`，列名与
//! [`crate::database::models`] 中的字段一一对应；`users.email` 与
//! `users.slug` 上有唯一索引。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::Executor;
use uuid::Uuid;

use super::{
    Artwork, ArtworkStore, Portfolio, PortfolioStore, StoreError, User, UserStore, ViewEvent,
    ViewStore,
};

const ARTWORK_COLUMNS: &str =
    "id, user_id, title, slug, url, public_id, views, is_public, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'artfolio_backend';")
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }
}

fn map_unique_violation(e: sqlx::Error, message: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(message.to_string())
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, email, password_hash, role, slug, portfolio_views, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(&user.slug)
        .bind(user.portfolio_views)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email or slug already exists"))?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_full_name(&self, full_name: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE lower(full_name) = lower($1) LIMIT 1",
        )
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl ArtworkStore for PgStore {
    async fn insert_artwork(&self, artwork: &Artwork) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO artworks (id, user_id, title, slug, url, public_id, views, is_public, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(artwork.id)
        .bind(artwork.user_id)
        .bind(&artwork.title)
        .bind(&artwork.slug)
        .bind(&artwork.url)
        .bind(&artwork.public_id)
        .bind(artwork.views)
        .bind(artwork.is_public)
        .bind(artwork.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_public_artworks(&self) -> Result<Vec<Artwork>, StoreError> {
        let sql = format!(
            "SELECT {ARTWORK_COLUMNS} FROM artworks WHERE is_public ORDER BY created_at DESC"
        );
        let artworks = sqlx::query_as::<_, Artwork>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(artworks)
    }

    async fn find_public_artwork(&self, id: Uuid) -> Result<Option<Artwork>, StoreError> {
        let sql = format!("SELECT {ARTWORK_COLUMNS} FROM artworks WHERE id = $1 AND is_public");
        let artwork = sqlx::query_as::<_, Artwork>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(artwork)
    }

    async fn list_artworks_by_owner(
        &self,
        owner: Uuid,
        public_only: bool,
    ) -> Result<Vec<Artwork>, StoreError> {
        let sql = format!(
            "SELECT {ARTWORK_COLUMNS} FROM artworks \
             WHERE user_id = $1 AND (is_public OR NOT $2) \
             ORDER BY created_at DESC"
        );
        let artworks = sqlx::query_as::<_, Artwork>(&sql)
            .bind(owner)
            .bind(public_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(artworks)
    }

    async fn find_owned_artwork(
        &self,
        id: Uuid,
        owner: Uuid,
    ) -> Result<Option<Artwork>, StoreError> {
        let sql = format!("SELECT {ARTWORK_COLUMNS} FROM artworks WHERE id = $1 AND user_id = $2");
        let artwork = sqlx::query_as::<_, Artwork>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        Ok(artwork)
    }

    async fn delete_artwork(&self, id: Uuid, owner: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM artworks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_artwork_views(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE artworks SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ViewStore for PgStore {
    async fn insert_view(&self, view: &ViewEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO view_events (id, artwork_id, user_id, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(view.id)
        .bind(view.artwork_id)
        .bind(view.user_id)
        .bind(view.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_views_for_owner(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ViewEvent>, StoreError> {
        let views = sqlx::query_as::<_, ViewEvent>(
            r#"
            SELECT v.id, v.artwork_id, v.user_id, v.created_at
            FROM view_events v
            JOIN artworks a ON a.id = v.artwork_id
            WHERE a.user_id = $1
              AND ($2::timestamptz IS NULL OR v.created_at >= $2)
            "#,
        )
        .bind(owner)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(views)
    }
}

#[async_trait]
impl PortfolioStore for PgStore {
    async fn insert_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO portfolios (id, user_id, title, description, image_url, tags, views, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(portfolio.id)
        .bind(portfolio.user_id)
        .bind(&portfolio.title)
        .bind(&portfolio.description)
        .bind(&portfolio.image_url)
        .bind(&portfolio.tags)
        .bind(portfolio.views)
        .bind(portfolio.created_at)
        .bind(portfolio.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_portfolios_by_owner(&self, owner: Uuid) -> Result<Vec<Portfolio>, StoreError> {
        let portfolios = sqlx::query_as::<_, Portfolio>(
            "SELECT * FROM portfolios WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(portfolios)
    }

    async fn find_portfolio(&self, id: Uuid) -> Result<Option<Portfolio>, StoreError> {
        let portfolio = sqlx::query_as::<_, Portfolio>("SELECT * FROM portfolios WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(portfolio)
    }

    async fn increment_portfolio_views(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE portfolios SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
