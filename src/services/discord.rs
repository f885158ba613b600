//! Discord 連携情報の取得
//!
//! ユーザーに保存された Discord トークンで `/users/@me` を呼び出し、
//! 画面表示用の `LinkedAccountInfo` を組み立てる。
//!
//! # Security
//! - access_token / refresh_token / client_secret はログに出力しない
//! - プロバイダー側のエラーは `LinkedAccountInfo::failed` で返し、通信エラーのみ `AppError`

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::error::AppError;
use crate::models::{ErrorDetail, LinkedAccountInfo, User};
use crate::repositories::DiscordTokenStore;

const DISCORD_CDN_URL: &str = "https://cdn.discordapp.com";

/// Discord のデフォルトアバター数
const DEFAULT_AVATAR_COUNT: u64 = 6;

/// ユーザーに紐付く外部アカウント情報の取得
#[async_trait]
pub trait LinkedAccountResolver: Send + Sync {
    async fn linked_account_info(&self, user: &User) -> Result<LinkedAccountInfo, AppError>;
}

/// Discord トークンエンドポイントからのレスポンス
#[derive(Debug, Deserialize)]
struct DiscordTokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[allow(dead_code)]
    token_type: String,
}

/// Discord `/users/@me` からのレスポンス
#[derive(Debug, Deserialize)]
struct DiscordUserResponse {
    id: String,
    username: String,
    global_name: Option<String>,
    avatar: Option<String>,
}

/// プロバイダー呼び出しの結果（失敗時は画面表示用のエラー詳細）
type ProviderResult<T> = Result<T, ErrorDetail>;

/// Discord 連携サービス
#[derive(Clone)]
pub struct DiscordService {
    client_id: String,
    /// クライアントシークレット（機密情報 - ログ出力禁止）
    client_secret: Arc<String>,
    api_base: String,
    http_client: reqwest::Client,
    token_store: Arc<dyn DiscordTokenStore>,
}

impl DiscordService {
    /// 新しい DiscordService を作成
    ///
    /// # Arguments
    /// * `client_id` - Discord OAuth クライアントID
    /// * `client_secret` - Discord OAuth クライアントシークレット（機密情報）
    /// * `api_base` - Discord API のベース URL（例: `https://discord.com/api`）
    /// * `token_store` - リフレッシュ後のトークン保存先
    pub fn new(
        client_id: String,
        client_secret: String,
        api_base: String,
        token_store: Arc<dyn DiscordTokenStore>,
    ) -> Self {
        Self {
            client_id,
            client_secret: Arc::new(client_secret),
            api_base: api_base.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            token_store,
        }
    }

    /// 期限切れのアクセストークンをリフレッシュし、新しいトークンを保存
    async fn refresh_access_token(
        &self,
        user: &User,
        refresh_token: &str,
    ) -> Result<ProviderResult<String>, AppError> {
        let body = format!(
            "client_id={}&client_secret={}&grant_type=refresh_token&refresh_token={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(self.client_secret.as_str()),
            urlencoding::encode(refresh_token),
        );

        let response = self
            .http_client
            .post(format!("{}/oauth2/token", self.api_base))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Discordトークンエンドポイント通信エラー");
                AppError::DiscordUnavailable(e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, user_id = %user.id, "Discordトークンリフレッシュ失敗");
            return Ok(Err(provider_error(status, body)));
        }

        let tokens: DiscordTokenResponse = match response.json().await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = ?e, "Discordトークンレスポンスのパースエラー");
                return Ok(Err(ErrorDetail::new("invalid Discord token response")));
            }
        };

        let Some(expires_at) =
            OffsetDateTime::now_utc().checked_add(Duration::seconds(tokens.expires_in))
        else {
            tracing::warn!(expires_in = tokens.expires_in, "Discordトークンの有効期限が不正");
            return Ok(Err(ErrorDetail::new("invalid Discord token response")));
        };

        self.token_store
            .save_discord_tokens(
                user.id,
                &tokens.access_token,
                &tokens.refresh_token,
                expires_at,
            )
            .await?;

        tracing::debug!(user_id = %user.id, "Discordトークンリフレッシュ成功");
        Ok(Ok(tokens.access_token))
    }

    /// アクセストークンで Discord ユーザー情報を取得
    async fn fetch_current_user(&self, access_token: &str) -> Result<LinkedAccountInfo, AppError> {
        let response = self
            .http_client
            .get(format!("{}/users/@me", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Discord users/@me 通信エラー");
                AppError::DiscordUnavailable(e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Discordユーザー情報取得エラー");
            return Ok(LinkedAccountInfo::failed(provider_error(status, body)));
        }

        match response.json::<DiscordUserResponse>().await {
            Ok(discord_user) => Ok(to_linked_account(discord_user)),
            Err(e) => {
                tracing::warn!(error = ?e, "Discordユーザー情報のパースエラー");
                Ok(LinkedAccountInfo::failed(ErrorDetail::new(
                    "invalid Discord user response",
                )))
            }
        }
    }
}

#[async_trait]
impl LinkedAccountResolver for DiscordService {
    async fn linked_account_info(&self, user: &User) -> Result<LinkedAccountInfo, AppError> {
        let Some(access_token) = user.discord_access_token.as_deref() else {
            tracing::debug!(user_id = %user.id, "Discordトークン未保存");
            return Ok(LinkedAccountInfo::unlinked());
        };

        let access_token =
            if is_token_expired(user.discord_access_token_expires, OffsetDateTime::now_utc()) {
                let Some(refresh_token) = user.discord_refresh_token.as_deref() else {
                    tracing::warn!(user_id = %user.id, "Discordトークン期限切れ（リフレッシュトークンなし）");
                    return Ok(LinkedAccountInfo::failed(ErrorDetail::new(
                        "Discord access token expired",
                    )));
                };

                match self.refresh_access_token(user, refresh_token).await? {
                    Ok(token) => token,
                    Err(detail) => return Ok(LinkedAccountInfo::failed(detail)),
                }
            } else {
                access_token.to_string()
            };

        self.fetch_current_user(&access_token).await
    }
}

/// 有効期限が未設定なら期限切れとみなさない
fn is_token_expired(expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    expires_at.is_some_and(|expires_at| expires_at <= now)
}

fn provider_error(status: StatusCode, body: String) -> ErrorDetail {
    ErrorDetail {
        message: format!("Discord API returned {}", status),
        status: Some(status.as_u16()),
        body: (!body.is_empty()).then_some(body),
    }
}

fn to_linked_account(discord_user: DiscordUserResponse) -> LinkedAccountInfo {
    let avatar_url = avatar_url(&discord_user.id, discord_user.avatar.as_deref());
    let username = discord_user
        .global_name
        .filter(|name| !name.is_empty())
        .unwrap_or(discord_user.username);

    LinkedAccountInfo {
        user_id: discord_user.id,
        username,
        avatar_url,
        error: None,
    }
}

/// アバター画像 URL
///
/// 未設定の場合は ID から決まるデフォルトアバター
fn avatar_url(user_id: &str, avatar_hash: Option<&str>) -> String {
    match avatar_hash {
        Some(hash) if !hash.is_empty() => {
            format!("{}/avatars/{}/{}.png", DISCORD_CDN_URL, user_id, hash)
        }
        _ => {
            let index = user_id
                .parse::<u64>()
                .map(|id| (id >> 22) % DEFAULT_AVATAR_COUNT)
                .unwrap_or(0);
            format!("{}/embed/avatars/{}.png", DISCORD_CDN_URL, index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_url_with_hash() {
        let url = avatar_url("80351110224678912", Some("8342729096ea3675442027381ff50dfe"));
        assert_eq!(
            url,
            "https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png"
        );
    }

    #[test]
    fn test_avatar_url_default() {
        // (80351110224678912 >> 22) % 6 == 5
        let url = avatar_url("80351110224678912", None);
        assert_eq!(url, "https://cdn.discordapp.com/embed/avatars/5.png");

        let url = avatar_url("80351110224678912", Some(""));
        assert_eq!(url, "https://cdn.discordapp.com/embed/avatars/5.png");
    }

    #[test]
    fn test_avatar_url_non_numeric_id() {
        let url = avatar_url("not-a-snowflake", None);
        assert_eq!(url, "https://cdn.discordapp.com/embed/avatars/0.png");
    }

    #[test]
    fn test_global_name_preferred() {
        let info = to_linked_account(DiscordUserResponse {
            id: "42".to_string(),
            username: "wumpus".to_string(),
            global_name: Some("Wumpus".to_string()),
            avatar: None,
        });
        assert_eq!(info.username, "Wumpus");
        assert!(info.is_linked());

        let info = to_linked_account(DiscordUserResponse {
            id: "42".to_string(),
            username: "wumpus".to_string(),
            global_name: None,
            avatar: None,
        });
        assert_eq!(info.username, "wumpus");
    }

    #[test]
    fn test_token_expiry() {
        let now = OffsetDateTime::now_utc();

        assert!(!is_token_expired(None, now));
        assert!(!is_token_expired(Some(now + Duration::minutes(5)), now));
        assert!(is_token_expired(Some(now), now));
        assert!(is_token_expired(Some(now - Duration::minutes(5)), now));
    }

    #[test]
    fn test_provider_error_detail() {
        let detail = provider_error(StatusCode::UNAUTHORIZED, r#"{"message":"401: Unauthorized"}"#.into());
        assert_eq!(detail.message, "Discord API returned 401 Unauthorized");
        assert_eq!(detail.status, Some(401));
        assert!(detail.body.is_some());

        let detail = provider_error(StatusCode::BAD_GATEWAY, String::new());
        assert_eq!(detail.body, None);
    }

    // ==========================================================================
    // スタブ Discord サーバーを使ったテスト
    // ==========================================================================

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{
        Form, Json, Router,
        extract::State,
        http::{HeaderMap, header::AUTHORIZATION},
        response::{IntoResponse, Response},
        routing::{get, post},
    };
    use uuid::Uuid;

    #[derive(Default)]
    struct StubDiscord {
        requests: AtomicUsize,
    }

    async fn stub_users_me(State(stub): State<Arc<StubDiscord>>, headers: HeaderMap) -> Response {
        stub.requests.fetch_add(1, Ordering::SeqCst);

        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        match authorization {
            "Bearer valid-access" | "Bearer refreshed-access" => Json(serde_json::json!({
                "id": "80351110224678912",
                "username": "wumpus",
                "global_name": "Wumpus",
                "avatar": null,
            }))
            .into_response(),
            _ => (
                StatusCode::UNAUTHORIZED,
                r#"{"message": "401: Unauthorized", "code": 0}"#,
            )
                .into_response(),
        }
    }

    async fn stub_token(
        State(stub): State<Arc<StubDiscord>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Response {
        stub.requests.fetch_add(1, Ordering::SeqCst);

        let field = |name: &str| form.get(name).map(String::as_str);
        if field("grant_type") != Some("refresh_token")
            || field("client_id") != Some("client-id")
            || field("client_secret") != Some("client-secret")
        {
            return (StatusCode::BAD_REQUEST, r#"{"error": "invalid_request"}"#).into_response();
        }

        let expires_in = match field("refresh_token") {
            Some("good-refresh") => 604_800,
            Some("overflow-refresh") => i64::MAX,
            _ => return (StatusCode::BAD_REQUEST, r#"{"error": "invalid_grant"}"#).into_response(),
        };

        Json(serde_json::json!({
            "access_token": "refreshed-access",
            "refresh_token": "rotated-refresh",
            "expires_in": expires_in,
            "token_type": "Bearer",
        }))
        .into_response()
    }

    /// スタブサーバーをランダムポートで起動
    async fn start_stub_server() -> (String, Arc<StubDiscord>) {
        let stub = Arc::new(StubDiscord::default());
        let app = Router::new()
            .route("/users/@me", get(stub_users_me))
            .route("/oauth2/token", post(stub_token))
            .with_state(stub.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/", addr), stub)
    }

    /// 接続を受け付けないアドレス
    async fn closed_base_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    type SavedTokens = (Uuid, String, String, OffsetDateTime);

    #[derive(Default)]
    struct RecordingTokenStore {
        saved: Mutex<Vec<SavedTokens>>,
    }

    #[async_trait]
    impl DiscordTokenStore for RecordingTokenStore {
        async fn save_discord_tokens(
            &self,
            user_id: Uuid,
            access_token: &str,
            refresh_token: &str,
            expires_at: OffsetDateTime,
        ) -> Result<(), AppError> {
            self.saved.lock().unwrap().push((
                user_id,
                access_token.to_string(),
                refresh_token.to_string(),
                expires_at,
            ));
            Ok(())
        }
    }

    fn create_test_service(api_base: String, store: Arc<RecordingTokenStore>) -> DiscordService {
        DiscordService::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            api_base,
            store,
        )
    }

    fn user_with_tokens(
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        expires_at: Option<OffsetDateTime>,
    ) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: "newbie".to_string(),
            discord_user_id: None,
            discord_access_token: access_token.map(str::to_string),
            discord_refresh_token: refresh_token.map(str::to_string),
            discord_access_token_expires: expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    fn expired() -> Option<OffsetDateTime> {
        Some(OffsetDateTime::now_utc() - Duration::hours(1))
    }

    #[tokio::test]
    async fn test_no_token_skips_provider() {
        let (base_url, stub) = start_stub_server().await;
        let service = create_test_service(base_url, Arc::default());

        let info = service
            .linked_account_info(&user_with_tokens(None, Some("good-refresh"), None))
            .await
            .unwrap();

        assert_eq!(info, LinkedAccountInfo::unlinked());
        assert_eq!(stub.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_token_returns_account() {
        let (base_url, stub) = start_stub_server().await;
        let store = Arc::new(RecordingTokenStore::default());
        let service = create_test_service(base_url, store.clone());

        let info = service
            .linked_account_info(&user_with_tokens(Some("valid-access"), None, None))
            .await
            .unwrap();

        assert_eq!(info.user_id, "80351110224678912");
        assert_eq!(info.username, "Wumpus");
        assert_eq!(info.avatar_url, "https://cdn.discordapp.com/embed/avatars/5.png");
        assert_eq!(info.error, None);
        assert_eq!(stub.requests.load(Ordering::SeqCst), 1);
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_token_returns_provider_error() {
        let (base_url, _stub) = start_stub_server().await;
        let service = create_test_service(base_url, Arc::default());

        let info = service
            .linked_account_info(&user_with_tokens(Some("revoked-access"), None, None))
            .await
            .unwrap();

        assert!(!info.is_linked());
        let error = info.error.unwrap();
        assert_eq!(error.message, "Discord API returned 401 Unauthorized");
        assert_eq!(error.status, Some(401));
        assert!(error.body.unwrap().contains("401: Unauthorized"));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token() {
        let (base_url, stub) = start_stub_server().await;
        let service = create_test_service(base_url, Arc::default());

        let info = service
            .linked_account_info(&user_with_tokens(Some("stale-access"), None, expired()))
            .await
            .unwrap();

        assert!(!info.is_linked());
        assert_eq!(info.error, Some(ErrorDetail::new("Discord access token expired")));
        assert_eq!(stub.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let (base_url, stub) = start_stub_server().await;
        let store = Arc::new(RecordingTokenStore::default());
        let service = create_test_service(base_url, store.clone());
        let user = user_with_tokens(Some("stale-access"), Some("good-refresh"), expired());

        let info = service.linked_account_info(&user).await.unwrap();

        assert_eq!(info.user_id, "80351110224678912");
        assert_eq!(info.error, None);
        // トークン交換 + users/@me
        assert_eq!(stub.requests.load(Ordering::SeqCst), 2);

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        let (user_id, access_token, refresh_token, expires_at) = &saved[0];
        assert_eq!(*user_id, user.id);
        assert_eq!(access_token, "refreshed-access");
        assert_eq!(refresh_token, "rotated-refresh");
        assert!(*expires_at > OffsetDateTime::now_utc());
    }

    #[tokio::test]
    async fn test_rejected_refresh_returns_provider_error() {
        let (base_url, stub) = start_stub_server().await;
        let store = Arc::new(RecordingTokenStore::default());
        let service = create_test_service(base_url, store.clone());

        let info = service
            .linked_account_info(&user_with_tokens(
                Some("stale-access"),
                Some("bad-refresh"),
                expired(),
            ))
            .await
            .unwrap();

        assert!(!info.is_linked());
        let error = info.error.unwrap();
        assert_eq!(error.status, Some(400));
        assert!(error.body.unwrap().contains("invalid_grant"));
        assert_eq!(stub.requests.load(Ordering::SeqCst), 1);
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_with_out_of_range_expiry() {
        let (base_url, _stub) = start_stub_server().await;
        let store = Arc::new(RecordingTokenStore::default());
        let service = create_test_service(base_url, store.clone());

        let info = service
            .linked_account_info(&user_with_tokens(
                Some("stale-access"),
                Some("overflow-refresh"),
                expired(),
            ))
            .await
            .unwrap();

        assert!(!info.is_linked());
        assert_eq!(info.error, Some(ErrorDetail::new("invalid Discord token response")));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_discord_unavailable() {
        let service = create_test_service(closed_base_url().await, Arc::default());

        let result = service
            .linked_account_info(&user_with_tokens(Some("valid-access"), None, None))
            .await;

        assert!(matches!(result, Err(AppError::DiscordUnavailable(_))));
    }
}
