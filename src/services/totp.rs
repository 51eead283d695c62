use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use totp_rs::{Algorithm, TOTP};

use crate::error::AppError;

/// コード桁数
pub const DIGITS: usize = 6;
/// タイムステップ（秒）
pub const STEP_SECS: u64 = 30;
/// デプロイ既定の許容ウィンドウ（前後ステップ数）
pub const DEFAULT_WINDOW: u8 = 1;

/// 指定時刻のTOTPコードを計算
///
/// カウンタは floor(timestamp / 30)、HMAC-SHA1 + 動的切り出し、
/// 10^6 剰余の6桁ゼロ埋め（RFC 6238）。
pub fn compute_code(secret: &str, timestamp: u64) -> Result<String, AppError> {
    let totp = build_totp(secret, 0)?;
    Ok(totp.generate(timestamp))
}

/// 指定時刻・指定ウィンドウでTOTPコードを検証
///
/// カウンタ ±window の候補と定数時間比較する。window = 0 は
/// 現在の30秒ステップのみ許容。
///
/// # Note
/// 6桁の数字でない入力はHMAC計算に入る前に false を返す。
pub fn verify_code_at(
    secret: &str,
    code: &str,
    timestamp: u64,
    window: u8,
) -> Result<bool, AppError> {
    // 入力検証: コードは6桁の数字のみ
    if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }

    let totp = build_totp(secret, window)?;
    Ok(totp.check(code, timestamp))
}

/// 現在時刻でTOTPコードを検証（前後1ステップを許容）
pub fn verify_code(secret: &str, code: &str) -> Result<bool, AppError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            tracing::error!(error = ?e, "システム時刻取得エラー");
            AppError::Internal(anyhow::anyhow!("system time error"))
        })?
        .as_secs();

    verify_code_at(secret, code, now, DEFAULT_WINDOW)
}

/// TOTP オブジェクトを作成
///
/// # Note
/// `TOTP::new` は128ビット未満のシークレットを拒否するため、
/// 80ビット（Base32で16文字）の既定シークレットを通すには
/// `new_unchecked` を使う必要がある。
fn build_totp(secret: &str, window: u8) -> Result<TOTP, AppError> {
    let secret_bytes = BASE32_NOPAD.decode(secret.as_bytes()).map_err(|e| {
        tracing::error!(error = ?e, "シークレットのBase32デコードエラー");
        AppError::Internal(anyhow::anyhow!("invalid base32 secret"))
    })?;

    Ok(TOTP::new_unchecked(
        Algorithm::SHA1,
        DIGITS,
        window,
        STEP_SECS,
        secret_bytes,
        None,
        String::new(),
    ))
}

/// シークレットの保存時暗号化サービス
///
/// # Security
/// - シークレットはAES-256-GCMで暗号化してDB保存
/// - シークレット平文はログに出力しない
#[derive(Clone)]
pub struct TotpService {
    encryption_key: [u8; 32],
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(encryption_key_base64: &str) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "TOTP暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        if key_bytes.len() != 32 {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "TOTP暗号化キーの長さが不正"
            );
            return Err(AppError::Internal(anyhow::anyhow!(
                "encryption key must be 32 bytes"
            )));
        }

        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self { encryption_key })
    }

    /// シークレットをAES-256-GCMで暗号化
    ///
    /// # Returns
    /// 96ビットnonce (12バイト) + 暗号文
    pub fn encrypt_secret(&self, secret: &str) -> Result<Vec<u8>, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        // 96ビット (12バイト) のランダムnonce生成
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレット暗号化エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        // nonce + ciphertext を結合
        let mut result = Vec::with_capacity(12 + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// 暗号化されたシークレットを復号
    pub fn decrypt_secret(&self, encrypted: &[u8]) -> Result<String, AppError> {
        if encrypted.len() < 12 {
            tracing::error!(len = encrypted.len(), "暗号化データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!(
                "encrypted data too short"
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::error!(error = ?e, "シークレット復号エラー");
            AppError::Internal(anyhow::anyhow!("decryption error"))
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }
}
