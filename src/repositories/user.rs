use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;

/// ユーザー検索
///
/// 接続結果ページはこのトレイト越しにユーザーを参照する。
/// テストではDBなしの実装に差し替える。
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError>;
}

/// Discord トークンの保存先
///
/// リフレッシュ後の新しいトークンを書き込む
#[async_trait]
pub trait DiscordTokenStore: Send + Sync {
    async fn save_discord_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ユーザーIDでユーザーを検索
    ///
    /// # Note
    /// DB セットアップ後は `query_as!` マクロに変更してコンパイル時SQL検証を有効にすること
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, discord_user_id, discord_access_token,
                   discord_refresh_token, discord_access_token_expires,
                   created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Discord トークンを更新（リフレッシュ後）
    ///
    /// # Note
    /// トークンはログに出力しないこと
    pub async fn update_discord_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET discord_access_token = $2,
                discord_refresh_token = $3,
                discord_access_token_expires = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UserLookup for UserRepository {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.find_by_id(user_id).await?)
    }
}

#[async_trait]
impl DiscordTokenStore for UserRepository {
    async fn save_discord_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        Ok(self
            .update_discord_tokens(user_id, access_token, refresh_token, expires_at)
            .await?)
    }
}
