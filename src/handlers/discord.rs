//! Discord 接続結果ハンドラー
//!
//! OAuth コールバック後にリダイレクトされる結果ページと、その props を返す JSON ルート。

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::Html,
};

use crate::error::AppError;
use crate::services::connect_result::{ConnectOutcome, ConnectResultQuery, resolve_outcome};
use crate::state::AppState;
use crate::views::render_connect_result;

/// Discord 接続結果ページ
///
/// GET /discord/success
///
/// 処理フロー:
/// 1. 接続結果を判定（セッション → ユーザー → Discord 情報）
/// 2. 結果に対応する画面を描画
pub async fn discord_success_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConnectResultQuery>,
) -> Result<Html<String>, AppError> {
    let outcome = load_outcome(&state, &headers, &query).await?;

    Ok(Html(render_connect_result(
        &outcome,
        &state.config.support_url,
    )))
}

/// Discord 接続結果の props
///
/// GET /api/discord/success
pub async fn discord_success_props(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConnectResultQuery>,
) -> Result<Json<ConnectOutcome>, AppError> {
    let outcome = load_outcome(&state, &headers, &query).await?;

    Ok(Json(outcome))
}

async fn load_outcome(
    state: &AppState,
    headers: &HeaderMap,
    query: &ConnectResultQuery,
) -> Result<ConnectOutcome, AppError> {
    let outcome = resolve_outcome(
        query,
        headers,
        state.session_reader.as_ref(),
        state.user_lookup.as_ref(),
        state.linked_accounts.as_ref(),
    )
    .await?;

    tracing::debug!(
        error_code = ?outcome.code().map(|code| code.as_u8()),
        "Discord接続結果判定完了"
    );

    Ok(outcome)
}
