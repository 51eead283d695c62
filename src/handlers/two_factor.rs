use axum::{Json, extract::State};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::CodeKind;
use crate::state::AppState;

// === 2FA Setup ===

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub account_id: Uuid,
    /// プロビジョニングURIに入るアカウント表示名（通常はメールアドレス）
    pub account_label: String,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub secret: String,
    pub provisioning_uri: String,
    pub qr_code: String,
    pub backup_codes: Vec<String>,
}

/// POST /api/2fa/setup
///
/// 2FA設定を開始（シークレット生成、QRコード・バックアップコード返却）
///
/// # Security
/// - プライマリ認証の確認は呼び出し側（ルーティング層）の責務
/// - シークレット・コード平文はログ出力禁止
pub async fn setup_2fa(
    State(state): State<AppState>,
    Json(request): Json<SetupRequest>,
) -> Result<Json<SetupResponse>, AppError> {
    // バリデーション
    validate_account_label(&request.account_label)?;

    let bundle = state
        .setup_service
        .begin_setup(request.account_id, &request.account_label)
        .await?;

    Ok(Json(SetupResponse {
        secret: bundle.secret,
        provisioning_uri: bundle.provisioning_uri,
        qr_code: format!("data:image/png;base64,{}", STANDARD.encode(&bundle.qr_png)),
        backup_codes: bundle.backup_codes,
    }))
}

// === 2FA Confirm ===

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub account_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub enabled: bool,
}

/// POST /api/2fa/confirm
///
/// 2FA設定確認（初回コード検証で有効化）
///
/// # Security
/// - コードはログ出力禁止
pub async fn confirm_2fa(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    // バリデーション
    validate_totp_code(&request.code)?;

    state
        .setup_service
        .confirm_setup(request.account_id, &request.code)
        .await?;

    Ok(Json(ConfirmResponse { enabled: true }))
}

// === 2FA Verify (login) ===

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub account_id: Uuid,
    pub kind: CodeKind,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
}

/// POST /api/2fa/verify
///
/// ログイン時の二次認証（TOTPコードまたはバックアップコード）
///
/// # Note
/// バックアップコードは形式の事前検証をしない。形式エラーと不一致を
/// 応答時間で区別させないため、そのまま検証経路に流す。
pub async fn verify_2fa(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    // バリデーション（TOTPのみ。6桁数字以外は暗号計算前に弾く）
    if request.kind == CodeKind::Totp {
        validate_totp_code(&request.code)?;
    }

    state
        .verification_service
        .verify_login(request.account_id, request.kind, &request.code)
        .await?;

    Ok(Json(VerifyResponse { verified: true }))
}

// === 2FA Disable ===

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub account_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DisableResponse {
    pub disabled: bool,
}

/// POST /api/2fa/disable
///
/// 2FA無効化
///
/// # Security
/// - プライマリ認証の再確認は呼び出し側の責務
pub async fn disable_2fa(
    State(state): State<AppState>,
    Json(request): Json<DisableRequest>,
) -> Result<Json<DisableResponse>, AppError> {
    state.setup_service.disable(request.account_id).await?;

    Ok(Json(DisableResponse { disabled: true }))
}

// === Backup Code Regenerate ===

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub account_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub backup_codes: Vec<String>,
}

/// POST /api/2fa/backup-codes/regenerate
///
/// バックアップコードを再生成（旧コードは未使用分も無効化）
pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<RegenerateResponse>, AppError> {
    let backup_codes = state
        .setup_service
        .regenerate_backup_codes(request.account_id)
        .await?;

    Ok(Json(RegenerateResponse { backup_codes }))
}

// === Helper Functions ===

/// TOTPコードバリデーション
fn validate_totp_code(code: &str) -> Result<(), AppError> {
    if code.is_empty() {
        return Err(AppError::Validation("認証コードは必須です".to_string()));
    }
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "認証コードは6桁の数字で入力してください".to_string(),
        ));
    }
    Ok(())
}

/// アカウントラベルバリデーション
fn validate_account_label(label: &str) -> Result<(), AppError> {
    if label.trim().is_empty() {
        return Err(AppError::Validation(
            "アカウントラベルは必須です".to_string(),
        ));
    }
    if label.len() > 255 {
        return Err(AppError::Validation(
            "アカウントラベルは255文字以内で入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_empty_code() {
        let result = validate_totp_code("");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_short_code() {
        let result = validate_totp_code("12345");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_non_digit_code() {
        let result = validate_totp_code("12345a");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_valid_code() {
        let result = validate_totp_code("123456");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_empty_label() {
        let result = validate_account_label("   ");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_long_label() {
        let result = validate_account_label(&"a".repeat(256));
        assert!(result.is_err());
    }

    #[test]
    fn test_verify_request_kind_deserialization() {
        let request: VerifyRequest = serde_json::from_str(
            r#"{"account_id":"0191d7c0-0000-7000-8000-000000000000","kind":"totp","code":"123456"}"#,
        )
        .unwrap();
        assert_eq!(request.kind, CodeKind::Totp);

        let request: VerifyRequest = serde_json::from_str(
            r#"{"account_id":"0191d7c0-0000-7000-8000-000000000000","kind":"backup","code":"A1B2C3D4"}"#,
        )
        .unwrap();
        assert_eq!(request.kind, CodeKind::Backup);
    }
}
