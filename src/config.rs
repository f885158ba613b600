use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // セッション設定
    /// セッション Cookie 暗号化キー（Base64エンコード、32バイト）
    pub session_secret: SecretBox<String>,
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,

    // Discord 連携設定
    pub discord_client_id: String,
    pub discord_client_secret: SecretBox<String>,
    #[serde(default = "default_discord_api_base")]
    pub discord_api_base: String,

    /// エラー画面に表示するサポートチャンネル URL
    #[serde(default = "default_support_url")]
    pub support_url: String,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_COOKIE_NAME: &str = "c0d3_session";
const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api";
pub const DEFAULT_SUPPORT_URL: &str =
    "https://discord.com/channels/828783458469675019/836343487531712512";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_session_cookie_name() -> String {
    DEFAULT_SESSION_COOKIE_NAME.to_string()
}

fn default_discord_api_base() -> String {
    DEFAULT_DISCORD_API_BASE.to_string()
}

fn default_support_url() -> String {
    DEFAULT_SUPPORT_URL.to_string()
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
