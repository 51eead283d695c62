use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// アカウントの二要素認証（TOTP）状態
///
/// 確認（confirm）成功時にのみ作成され、無効化時に削除される。
/// したがってレコードが存在する間は原則 enabled = true。
/// シークレットは AES-256-GCM で暗号化されて保存される
/// 平文シークレットはログに出力禁止
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccountTwoFactor {
    pub account_id: Uuid,
    #[serde(skip)]
    pub secret_encrypted: Vec<u8>,
    pub enabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// バックアップコードのハッシュ（argon2id、ソルト付き）
///
/// 平文コードは生成時に一度だけユーザーへ表示され、保存されない。
/// used = true になったコードは二度と検証に成功しない（使い捨て）。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BackupCodeHash {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(skip)]
    pub code_hash: String,
    pub used: bool,
    pub used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}
