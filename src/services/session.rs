//! Cookie セッション
//!
//! ログイン側で発行されたセッション Cookie からユーザーIDを取り出す。
//!
//! # Security
//! - Cookie 値は AES-256-GCM で暗号化されたユーザーID（nonce + ciphertext）
//! - 改ざん・復号失敗は「未ログイン」として扱い、エラーにはしない

use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use async_trait::async_trait;
use axum::http::{HeaderMap, header::COOKIE};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use uuid::Uuid;

use crate::error::AppError;

const NONCE_LEN: usize = 12;

/// セッションから取り出した認証済みユーザー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
}

/// セッション読み取り
#[async_trait]
pub trait SessionReader: Send + Sync {
    /// リクエストヘッダーから認証済みユーザーを取得
    ///
    /// セッションが無い場合は `Ok(None)`
    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<SessionUser>, AppError>;
}

/// セッション Cookie 値の暗号化・復号
#[derive(Clone)]
pub struct SessionCodec {
    key: [u8; 32],
}

impl SessionCodec {
    /// 新しい SessionCodec を作成
    ///
    /// # Arguments
    /// * `secret_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(secret_base64: &str) -> Result<Self, AppError> {
        let key_bytes = URL_SAFE_NO_PAD
            .decode(secret_base64)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(secret_base64))
            .map_err(|e| {
                tracing::error!(error = ?e, "セッション暗号化キーのBase64デコードエラー");
                AppError::Config("invalid session secret format".to_string())
            })?;

        if key_bytes.len() != 32 {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "セッション暗号化キーの長さが不正"
            );
            return Err(AppError::Config(
                "session secret must be 32 bytes".to_string(),
            ));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);

        Ok(Self { key })
    }

    /// ユーザーIDを暗号化して Cookie 値を生成
    pub fn seal(&self, user_id: Uuid) -> Result<String, AppError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, user_id.as_bytes().as_slice())
            .map_err(|e| {
                tracing::error!(error = ?e, "セッション暗号化エラー");
                AppError::Internal(anyhow::anyhow!("session encryption error"))
            })?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(&combined))
    }

    /// Cookie 値を復号してユーザーIDを取得
    ///
    /// 不正な値は `None`
    pub fn open(&self, value: &str) -> Option<Uuid> {
        let encrypted = match URL_SAFE_NO_PAD.decode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = ?e, "セッションCookie Base64デコードエラー（改ざんの可能性）");
                return None;
            }
        };

        if encrypted.len() < NONCE_LEN {
            tracing::warn!(
                len = encrypted.len(),
                "セッションCookieが短すぎる（改ざんの可能性）"
            );
            return None;
        }

        let cipher = self.cipher().ok()?;
        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = match cipher.decrypt(nonce, ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(error = ?e, "セッションCookie復号エラー（改ざんの可能性）");
                return None;
            }
        };

        match Uuid::from_slice(&plaintext) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = ?e, "セッションCookieのユーザーIDが不正");
                None
            }
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm, AppError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })
    }
}

/// Cookie ベースの SessionReader
#[derive(Clone)]
pub struct CookieSessionReader {
    cookie_name: String,
    codec: SessionCodec,
}

impl CookieSessionReader {
    pub fn new(cookie_name: String, codec: SessionCodec) -> Self {
        Self { cookie_name, codec }
    }

    fn find_cookie<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value)
    }
}

#[async_trait]
impl SessionReader for CookieSessionReader {
    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<SessionUser>, AppError> {
        let Some(value) = self.find_cookie(headers) else {
            tracing::debug!("セッションCookieなし");
            return Ok(None);
        };

        Ok(self.codec.open(value).map(|id| SessionUser { id }))
    }
}
