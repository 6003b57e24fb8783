use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::repo_types::User,
    error::{AppError, AppResult},
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> AppResult<()>;
    /// Writes the profile columns only: username, email, display name, images.
    async fn update(&self, user: &User) -> AppResult<()>;
    async fn set_password_hash(&self, id: Uuid, hash: &str) -> AppResult<()>;
    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&str>) -> AppResult<()>;
    /// No-op when the user no longer exists.
    async fn set_watch_history(&self, id: Uuid, video_id: Uuid) -> AppResult<()>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    /// Matches either the normalized username or the normalized email,
    /// preferring the username match.
    async fn find_by_login(&self, username: Option<&str>, email: Option<&str>) -> AppResult<Option<User>>;
}

/// Writes a user, hashing the password first if it was changed since the last write.
pub async fn save_user(store: &dyn UserStore, user: &mut User, is_new: bool) -> AppResult<()> {
    let password_changed = user.hash_pending_password()?;
    if is_new {
        return store.insert(user).await;
    }
    user.updated_at = time::OffsetDateTime::now_utc();
    store.update(user).await?;
    if password_changed {
        store.set_password_hash(user.id, &user.password_hash).await?;
    }
    Ok(())
}

const USER_COLUMNS: &str = "id, username, email, display_name, avatar_url, cover_image_url, \
     watch_history, password_hash, refresh_token_hash, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, display_name, avatar_url, cover_image_url,
                               watch_history, password_hash, refresh_token_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(&user.cover_image_url)
        .bind(user.watch_history)
        .bind(&user.password_hash)
        .bind(&user.refresh_token_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update(&self, user: &User) -> AppResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET username = $2, email = $3, display_name = $4, avatar_url = $5,
                   cover_image_url = $6, updated_at = $7
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(&user.cover_image_url)
        .bind(user.updated_at)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> AppResult<()> {
        let res = sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&str>) -> AppResult<()> {
        sqlx::query("UPDATE users SET refresh_token_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn set_watch_history(&self, id: Uuid, video_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET watch_history = $2 WHERE id = $1")
            .bind(id)
            .bind(video_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 \
             ORDER BY (username = $1) IS TRUE DESC LIMIT 1"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}
