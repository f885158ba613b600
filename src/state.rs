use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{UserLookup, UserRepository};
use crate::services::discord::LinkedAccountResolver;
use crate::services::session::SessionReader;
use crate::services::{CookieSessionReader, DiscordService, SessionCodec};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// セッション読み取り
    pub session_reader: Arc<dyn SessionReader>,
    /// ユーザー検索
    pub user_lookup: Arc<dyn UserLookup>,
    /// Discord 連携情報の取得
    pub linked_accounts: Arc<dyn LinkedAccountResolver>,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let codec = SessionCodec::new(config.session_secret.expose_secret())?;
        let session_reader = CookieSessionReader::new(config.session_cookie_name.clone(), codec);

        let user_repo = UserRepository::new(db_pool);
        let discord_service = DiscordService::new(
            config.discord_client_id.clone(),
            config.discord_client_secret.expose_secret().clone(),
            config.discord_api_base.clone(),
            Arc::new(user_repo.clone()),
        );

        tracing::info!(api_base = %config.discord_api_base, "Discord 連携サービスを初期化");

        tracing::info!(cookie = %config.session_cookie_name, "セッション読み取りを初期化");

        Ok(Self::from_parts(
            config,
            Arc::new(session_reader),
            Arc::new(user_repo),
            Arc::new(discord_service),
        ))
    }

    /// 各コンポーネントを指定して AppState を作成（テスト用の差し替えにも使う）
    pub fn from_parts(
        config: Config,
        session_reader: Arc<dyn SessionReader>,
        user_lookup: Arc<dyn UserLookup>,
        linked_accounts: Arc<dyn LinkedAccountResolver>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            session_reader,
            user_lookup,
            linked_accounts,
        }
    }
}
