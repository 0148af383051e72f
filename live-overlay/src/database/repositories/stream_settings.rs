//! Stream settings repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::StreamSettingsDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;

/// Data access for per-owner stream settings.
#[async_trait]
pub trait StreamSettingsRepository: Send + Sync {
    /// Settings row `id`, only if it belongs to `owner_id`.
    async fn find_for_owner(&self, owner_id: &str, id: i64)
    -> Result<Option<StreamSettingsDbModel>>;

    async fn find_by_owner(&self, owner_id: &str) -> Result<Option<StreamSettingsDbModel>>;

    /// Create or replace the owner's source URL. The row id is stable across
    /// updates.
    async fn upsert(&self, owner_id: &str, rtsp_url: &str) -> Result<StreamSettingsDbModel>;
}

/// SQLx implementation of [`StreamSettingsRepository`].
pub struct SqlxStreamSettingsRepository {
    pool: SqlitePool,
}

impl SqlxStreamSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamSettingsRepository for SqlxStreamSettingsRepository {
    async fn find_for_owner(
        &self,
        owner_id: &str,
        id: i64,
    ) -> Result<Option<StreamSettingsDbModel>> {
        let settings = sqlx::query_as::<_, StreamSettingsDbModel>(
            "SELECT * FROM stream_settings WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(settings)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Option<StreamSettingsDbModel>> {
        let settings = sqlx::query_as::<_, StreamSettingsDbModel>(
            "SELECT * FROM stream_settings WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(settings)
    }

    async fn upsert(&self, owner_id: &str, rtsp_url: &str) -> Result<StreamSettingsDbModel> {
        retry_on_sqlite_busy("upsert_stream_settings", || async {
            let now = now_ms();
            let settings = sqlx::query_as::<_, StreamSettingsDbModel>(
                r#"
                INSERT INTO stream_settings (owner_id, rtsp_url, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(owner_id) DO UPDATE SET
                    rtsp_url = excluded.rtsp_url,
                    updated_at = excluded.updated_at
                RETURNING *
                "#,
            )
            .bind(owner_id)
            .bind(rtsp_url)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
            Ok(settings)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool_with_size, run_migrations};

    async fn repository() -> SqlxStreamSettingsRepository {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlxStreamSettingsRepository::new(pool)
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_owner() {
        let repo = repository().await;

        let first = repo.upsert("alice", "rtsp://cam/1").await.unwrap();
        let updated = repo.upsert("alice", "rtsp://cam/2").await.unwrap();

        assert_eq!(first.id, updated.id);
        assert_eq!(updated.rtsp_url, "rtsp://cam/2");
        assert_eq!(updated.created_at, first.created_at);
        assert!(updated.updated_at >= first.updated_at);

        let bob = repo.upsert("bob", "rtsp://cam/9").await.unwrap();
        assert_ne!(bob.id, first.id);
    }

    #[tokio::test]
    async fn find_for_owner_checks_ownership() {
        let repo = repository().await;
        let alice = repo.upsert("alice", "rtsp://cam/1").await.unwrap();

        assert_eq!(
            repo.find_for_owner("alice", alice.id).await.unwrap(),
            Some(alice.clone())
        );
        assert!(repo.find_for_owner("bob", alice.id).await.unwrap().is_none());
        assert!(repo.find_for_owner("alice", alice.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_owner_returns_none_without_settings() {
        let repo = repository().await;
        assert!(repo.find_by_owner("carol").await.unwrap().is_none());

        repo.upsert("carol", "rtsp://cam/3").await.unwrap();
        let found = repo.find_by_owner("carol").await.unwrap().unwrap();
        assert_eq!(found.rtsp_url, "rtsp://cam/3");
    }
}
