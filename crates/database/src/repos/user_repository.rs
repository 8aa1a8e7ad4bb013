//! Users as seen by the chat layer, plus their presence columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use taskhub_realtime::{
    PresenceStore, Role, StoreResult, UserId, UserProfile, UserSummary,
};
use tracing::{debug, info};

use crate::types::{
    decode_optional_timestamp, encode_timestamp, DatabaseError, DatabaseResult,
};

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts the user or refreshes its display fields and role.
    pub async fn upsert(&self, profile: &UserProfile) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, avatar, role, is_online, last_active, created_at)
             VALUES (?, ?, ?, ?, 0, NULL, ?)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                avatar = excluded.avatar,
                role = excluded.role",
        )
        .bind(profile.id.as_str())
        .bind(&profile.username)
        .bind(&profile.avatar)
        .bind(profile.role.as_str())
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        info!(user_id = %profile.id, username = %profile.username, "user upserted");
        Ok(())
    }

    pub async fn find_by_id(&self, id: &UserId) -> DatabaseResult<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT id, username, avatar, role, is_online, last_active FROM users WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    pub async fn find_summary(&self, id: &UserId) -> DatabaseResult<Option<UserSummary>> {
        Ok(self.find_by_id(id).await?.map(|profile| profile.summary()))
    }

    /// All users, most recently active first.
    pub async fn list(&self) -> DatabaseResult<Vec<UserProfile>> {
        let rows = sqlx::query(
            "SELECT id, username, avatar, role, is_online, last_active FROM users
             ORDER BY last_active IS NULL, last_active DESC, username ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(profile_from_row).collect()
    }

    pub async fn update_presence(
        &self,
        id: &UserId,
        online: bool,
        last_active: DateTime<Utc>,
    ) -> DatabaseResult<()> {
        let result = sqlx::query("UPDATE users SET is_online = ?, last_active = ? WHERE id = ?")
            .bind(online)
            .bind(encode_timestamp(last_active))
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::UserNotFound(id.to_string()));
        }
        debug!(user_id = %id, online, "presence stored");
        Ok(())
    }

    pub async fn update_last_active(&self, id: &UserId, at: DateTime<Utc>) -> DatabaseResult<()> {
        let result = sqlx::query("UPDATE users SET last_active = ? WHERE id = ?")
            .bind(encode_timestamp(at))
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Clears online flags left over from a previous process.
    pub async fn reset_presence(&self) -> DatabaseResult<u64> {
        let result = sqlx::query("UPDATE users SET is_online = 0 WHERE is_online = 1")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn profile_from_row(row: &SqliteRow) -> DatabaseResult<UserProfile> {
    let role: String = row.try_get("role")?;
    Ok(UserProfile {
        id: UserId::new(row.try_get::<String, _>("id")?),
        username: row.try_get("username")?,
        avatar: row.try_get("avatar")?,
        role: Role::parse(&role)
            .ok_or_else(|| DatabaseError::InvalidRow(format!("unknown role {role:?}")))?,
        is_online: row.try_get("is_online")?,
        last_active: decode_optional_timestamp(row.try_get("last_active")?)?,
    })
}

#[async_trait]
impl PresenceStore for UserRepository {
    async fn set_presence(
        &self,
        user: &UserId,
        online: bool,
        last_active: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(self.update_presence(user, online, last_active).await?)
    }

    async fn touch_last_active(&self, user: &UserId, at: DateTime<Utc>) -> StoreResult<()> {
        Ok(self.update_last_active(user, at).await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        Ok(self.list().await?)
    }
}
