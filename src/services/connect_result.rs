//! Discord 接続結果の判定
//!
//! # 判定順序（最初に一致したものを採用）
//! 1. クエリ `error=connected` → 別アカウントで連携済み（セッション・DBは参照しない）
//! 2. セッションなし → 未ログイン
//! 3. ユーザーが存在しない → 未ログイン
//! 4. Discord ユーザーIDが取得できない → Discord エラー
//! 5. 上記以外 → 接続成功
//!
//! 呼び出しはすべて逐次。書き込みは行わない。

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};

use crate::error::AppError;
use crate::models::{ErrorDetail, LinkedAccountInfo};
use crate::repositories::UserLookup;
use crate::services::discord::LinkedAccountResolver;
use crate::services::session::SessionReader;

/// 連携済みを示すクエリ値（プロバイダーからのリダイレクト時に付与される）
pub const ALREADY_CONNECTED_QUERY_VALUE: &str = "connected";

/// 接続結果ページのクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct ConnectResultQuery {
    pub error: Option<String>,
}

/// 結果コード（成功時はコードなし）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeCode {
    NotLoggedIn = 1,
    ProviderError = 2,
    AlreadyConnectedElsewhere = 3,
}

impl OutcomeCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// ユーザーIDが空でないことが保証された Discord アカウント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAccount(LinkedAccountInfo);

impl ConnectedAccount {
    /// `user_id` が空なら `None`
    pub fn from_info(info: LinkedAccountInfo) -> Option<Self> {
        info.is_linked().then_some(Self(info))
    }

    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }

    pub fn username(&self) -> &str {
        &self.0.username
    }

    pub fn avatar_url(&self) -> &str {
        &self.0.avatar_url
    }

    pub fn info(&self) -> &LinkedAccountInfo {
        &self.0
    }

    /// Discord プロフィールページ
    pub fn profile_url(&self) -> String {
        format!("https://discordapp.com/users/{}/", self.0.user_id)
    }
}

/// 接続結果（画面の props）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    NotLoggedIn,
    ProviderError {
        username: String,
        error: Option<ErrorDetail>,
    },
    AlreadyConnectedElsewhere,
    Connected {
        username: String,
        account: ConnectedAccount,
    },
}

impl ConnectOutcome {
    pub fn code(&self) -> Option<OutcomeCode> {
        match self {
            Self::NotLoggedIn => Some(OutcomeCode::NotLoggedIn),
            Self::ProviderError { .. } => Some(OutcomeCode::ProviderError),
            Self::AlreadyConnectedElsewhere => Some(OutcomeCode::AlreadyConnectedElsewhere),
            Self::Connected { .. } => None,
        }
    }
}

/// JSON では `{ errorCode, username, userInfo, error }` の形で返す
impl Serialize for ConnectOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::NotLoggedIn | Self::AlreadyConnectedElsewhere => {
                let mut props = serializer.serialize_struct("ConnectOutcome", 1)?;
                props.serialize_field("errorCode", &self.code().map(OutcomeCode::as_u8))?;
                props.end()
            }
            Self::ProviderError { username, error } => {
                let mut props = serializer.serialize_struct("ConnectOutcome", 3)?;
                props.serialize_field("errorCode", &self.code().map(OutcomeCode::as_u8))?;
                props.serialize_field("username", username)?;
                if let Some(error) = error {
                    props.serialize_field("error", error)?;
                }
                props.end()
            }
            Self::Connected { username, account } => {
                let mut props = serializer.serialize_struct("ConnectOutcome", 2)?;
                props.serialize_field("username", username)?;
                props.serialize_field("userInfo", account.info())?;
                props.end()
            }
        }
    }
}

/// 接続結果を判定
///
/// # Errors
/// セッション・DB・Discord の通信エラーはそのまま返す（リトライしない）
pub async fn resolve_outcome(
    query: &ConnectResultQuery,
    headers: &HeaderMap,
    sessions: &dyn SessionReader,
    users: &dyn UserLookup,
    linked_accounts: &dyn LinkedAccountResolver,
) -> Result<ConnectOutcome, AppError> {
    // 1. 別アカウントで連携済み
    if query.error.as_deref() == Some(ALREADY_CONNECTED_QUERY_VALUE) {
        tracing::info!("Discordアカウントは別ユーザーに連携済み");
        return Ok(ConnectOutcome::AlreadyConnectedElsewhere);
    }

    // 2. セッション確認
    let Some(session_user) = sessions.current_user(headers).await? else {
        tracing::info!("未ログインでのDiscord接続結果表示");
        return Ok(ConnectOutcome::NotLoggedIn);
    };

    // 3. ユーザー検索
    let Some(user) = users.find_user(session_user.id).await? else {
        tracing::warn!(user_id = %session_user.id, "セッションのユーザーが存在しない");
        return Ok(ConnectOutcome::NotLoggedIn);
    };
    tracing::debug!(user_id = %user.id, "ユーザー取得成功");

    // 4. Discord 連携情報取得
    let mut info = linked_accounts.linked_account_info(&user).await?;
    let error = info.error.take();

    match ConnectedAccount::from_info(info) {
        Some(account) => {
            tracing::info!(user_id = %user.id, "Discord接続成功");
            Ok(ConnectOutcome::Connected {
                username: user.username,
                account,
            })
        }
        None => {
            tracing::warn!(user_id = %user.id, "DiscordユーザーIDを取得できない");
            Ok(ConnectOutcome::ProviderError {
                username: user.username,
                error,
            })
        }
    }
}
