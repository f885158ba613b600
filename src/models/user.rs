use std::fmt;

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// c0d3 ユーザー
///
/// Discord トークンは OAuth コールバック側で保存される。
/// トークンはログ出力禁止（Debug 出力でも伏せる）
#[derive(Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub discord_user_id: Option<String>,
    pub discord_access_token: Option<String>,
    pub discord_refresh_token: Option<String>,
    pub discord_access_token_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const REDACTED: &str = "[REDACTED]";

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("discord_user_id", &self.discord_user_id)
            .field(
                "discord_access_token",
                &self.discord_access_token.as_ref().map(|_| REDACTED),
            )
            .field(
                "discord_refresh_token",
                &self.discord_refresh_token.as_ref().map(|_| REDACTED),
            )
            .field(
                "discord_access_token_expires",
                &self.discord_access_token_expires,
            )
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
