use serde::Serialize;

/// 連携ヘルパーが返す Discord アカウント情報
///
/// `user_id` が空の場合は「連携なし」として扱う
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccountInfo {
    pub user_id: String,
    pub username: String,
    pub avatar_url: String,
    /// プロバイダーが返したエラー（取得失敗時のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl LinkedAccountInfo {
    /// 連携なし
    pub fn unlinked() -> Self {
        Self::default()
    }

    /// 取得失敗（エラー詳細つき）
    pub fn failed(error: ErrorDetail) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_linked(&self) -> bool {
        !self.user_id.trim().is_empty()
    }
}

/// エラー画面の「Error log」に表示する生データ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn has_message(&self) -> bool {
        !self.message.is_empty()
    }
}
