use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// ページ表示で扱わない基盤レベルのエラー
///
/// 未ログイン・Discord エラー・連携済みは `ConnectOutcome` で表現し、
/// ここには到達しない。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("Discord API との通信に失敗しました")]
    DiscordUnavailable(#[from] reqwest::Error),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::DiscordUnavailable(e) => {
                tracing::error!(error = ?e, "Discord通信エラー");
                (
                    StatusCode::BAD_GATEWAY,
                    "Discord との通信に失敗しました".to_string(),
                )
            }
            Self::Config(msg) => {
                tracing::error!(error = %msg, "設定エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
