use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    pub totp_issuer: String,
    /// AES-256暗号化キー（Base64エンコード、32バイト）
    pub encryption_key: SecretBox<String>,

    /// 未確認の設定（PendingSetup）の有効期間（秒）
    #[serde(default = "default_pending_setup_ttl_secs")]
    pub pending_setup_ttl_secs: i64,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PENDING_SETUP_TTL_SECS: i64 = 900;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_pending_setup_ttl_secs() -> i64 {
    DEFAULT_PENDING_SETUP_TTL_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
