use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::AccountTwoFactor;
use crate::repositories::TwoFactorRepository;
use crate::services::{TotpService, backup_codes, totp};

/// ログイン時に提示されるコードの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Totp,
    Backup,
}

/// ログイン時の二次認証ゲートウェイ
///
/// プライマリ認証通過後に呼ばれる。二要素認証状態に対して読み取り
/// 専用で、書き込むのはバックアップコードの used フラグのみ。
/// 成功時に認証コンテキストを「2FA済み」へ更新するのは呼び出し側の責務。
#[derive(Clone)]
pub struct VerificationService<R> {
    repo: R,
    totp_service: TotpService,
}

impl<R: TwoFactorRepository> VerificationService<R> {
    /// 新しい VerificationService を作成
    pub fn new(repo: R, totp_service: TotpService) -> Self {
        Self { repo, totp_service }
    }

    /// 二次認証コードを検証
    ///
    /// # Security
    /// - コード平文はログ出力禁止
    pub async fn verify_login(
        &self,
        account_id: Uuid,
        kind: CodeKind,
        code: &str,
    ) -> Result<(), AppError> {
        let state = self
            .repo
            .find_by_account_id(account_id)
            .await?
            .ok_or(AppError::TotpNotEnabled)?;

        if !state.enabled {
            return Err(AppError::TotpNotEnabled);
        }

        match kind {
            CodeKind::Totp => self.verify_totp(&state, code),
            CodeKind::Backup => self.verify_backup(account_id, code).await,
        }
    }

    /// TOTPコードを検証（前後1ステップを許容）
    fn verify_totp(&self, state: &AccountTwoFactor, code: &str) -> Result<(), AppError> {
        let secret = self.totp_service.decrypt_secret(&state.secret_encrypted)?;

        if totp::verify_code(&secret, code)? {
            tracing::info!(account_id = %state.account_id, "TOTPコード検証成功");
            Ok(())
        } else {
            tracing::warn!(account_id = %state.account_id, "TOTPコード検証失敗");
            Err(AppError::TotpInvalid)
        }
    }

    /// バックアップコードを検証し、一致したコードを使用済みにする
    ///
    /// 未使用ハッシュの線形走査（最大10件）。マークは条件付き更新の
    /// ため、並行する2リクエストが同じコードで二重に認証することはない。
    async fn verify_backup(&self, account_id: Uuid, code: &str) -> Result<(), AppError> {
        // 入力の正規化（前後空白と小文字を許容）
        let code = code.trim().to_uppercase();

        let candidates = self.repo.find_unused_backup_codes(account_id).await?;

        for candidate in &candidates {
            if backup_codes::verify_code(&code, &candidate.code_hash) {
                if self.repo.consume_backup_code(account_id, candidate.id).await? {
                    tracing::info!(
                        account_id = %account_id,
                        code_id = %candidate.id,
                        "バックアップコード使用"
                    );
                    return Ok(());
                }

                // 並行リクエストに先に消費された
                tracing::warn!(
                    account_id = %account_id,
                    code_id = %candidate.id,
                    "バックアップコードの二重消費を検出"
                );
                return Err(AppError::TotpInvalid);
            }
        }

        tracing::warn!(account_id = %account_id, "バックアップコード検証失敗");
        Err(AppError::TotpInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemoryTwoFactorRepository, PendingSetupStore};
    use crate::services::{ProvisioningService, SetupService};
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    struct Harness {
        setup: SetupService<InMemoryTwoFactorRepository>,
        verify: VerificationService<InMemoryTwoFactorRepository>,
    }

    fn create_harness() -> Harness {
        let repo = InMemoryTwoFactorRepository::new();
        let key_base64 = STANDARD.encode([0u8; 32]);
        let totp_service = TotpService::new(&key_base64).unwrap();

        Harness {
            setup: SetupService::new(
                repo.clone(),
                PendingSetupStore::new(900),
                totp_service.clone(),
                ProvisioningService::new("OtpGate".to_string()),
            ),
            verify: VerificationService::new(repo, totp_service),
        }
    }

    fn now_secs() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn valid_code(secret: &str) -> String {
        totp::compute_code(secret, now_secs()).unwrap()
    }

    /// 許容ウィンドウ内のどの候補とも一致しないコード
    fn wrong_code(secret: &str) -> String {
        let now = now_secs();
        let mut wrong = 0u32;
        loop {
            let candidate = format!("{wrong:06}");
            let collides = [now - 30, now, now + 30]
                .iter()
                .any(|t| totp::compute_code(secret, *t).unwrap() == candidate);
            if !collides {
                return candidate;
            }
            wrong += 1;
        }
    }

    /// begin → confirm まで進めて有効化済みアカウントを作る
    async fn enroll(harness: &Harness, account_id: Uuid) -> (String, Vec<String>) {
        let bundle = harness.setup.begin_setup(account_id, "u1").await.unwrap();
        harness
            .setup
            .confirm_setup(account_id, &valid_code(&bundle.secret))
            .await
            .unwrap();
        (bundle.secret, bundle.backup_codes)
    }

    #[tokio::test]
    async fn test_verify_login_not_enabled() {
        let harness = create_harness();

        let result = harness
            .verify
            .verify_login(Uuid::new_v4(), CodeKind::Totp, "123456")
            .await;
        assert!(matches!(result, Err(AppError::TotpNotEnabled)));
    }

    #[tokio::test]
    async fn test_verify_login_totp() {
        let harness = create_harness();
        let account_id = Uuid::new_v4();
        let (secret, _) = enroll(&harness, account_id).await;

        harness
            .verify
            .verify_login(account_id, CodeKind::Totp, &valid_code(&secret))
            .await
            .unwrap();

        let result = harness
            .verify
            .verify_login(account_id, CodeKind::Totp, &wrong_code(&secret))
            .await;
        assert!(matches!(result, Err(AppError::TotpInvalid)));
    }

    #[tokio::test]
    async fn test_backup_code_is_single_use() {
        let harness = create_harness();
        let account_id = Uuid::new_v4();
        let (_, codes) = enroll(&harness, account_id).await;

        // 1回目は成功
        harness
            .verify
            .verify_login(account_id, CodeKind::Backup, &codes[0])
            .await
            .unwrap();

        // 同じコードの2回目は失敗（使い捨て）
        let result = harness
            .verify
            .verify_login(account_id, CodeKind::Backup, &codes[0])
            .await;
        assert!(matches!(result, Err(AppError::TotpInvalid)));

        // 別の未使用コードはまだ使える
        harness
            .verify
            .verify_login(account_id, CodeKind::Backup, &codes[1])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_backup_code_input_is_normalized() {
        let harness = create_harness();
        let account_id = Uuid::new_v4();
        let (_, codes) = enroll(&harness, account_id).await;

        // 小文字・前後空白を許容する
        let sloppy = format!("  {}  ", codes[0].to_lowercase());
        harness
            .verify
            .verify_login(account_id, CodeKind::Backup, &sloppy)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_backup_code_fails() {
        let harness = create_harness();
        let account_id = Uuid::new_v4();
        enroll(&harness, account_id).await;

        let result = harness
            .verify
            .verify_login(account_id, CodeKind::Backup, "ZZZZZZZZ")
            .await;
        assert!(matches!(result, Err(AppError::TotpInvalid)));
    }

    #[tokio::test]
    async fn test_regenerate_invalidates_old_codes() {
        let harness = create_harness();
        let account_id = Uuid::new_v4();
        let (_, old_codes) = enroll(&harness, account_id).await;

        let new_codes = harness
            .setup
            .regenerate_backup_codes(account_id)
            .await
            .unwrap();
        assert_eq!(new_codes.len(), 10);

        // 旧コードは未使用でも無効
        let result = harness
            .verify
            .verify_login(account_id, CodeKind::Backup, &old_codes[0])
            .await;
        assert!(matches!(result, Err(AppError::TotpInvalid)));

        // 新コードは有効
        harness
            .verify
            .verify_login(account_id, CodeKind::Backup, &new_codes[0])
            .await
            .unwrap();
    }

    /// 設定から検証までのエンドツーエンドシナリオ
    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let harness = create_harness();
        let account_id = Uuid::new_v4();

        let bundle = harness.setup.begin_setup(account_id, "u1").await.unwrap();
        assert_eq!(bundle.backup_codes.len(), 10);

        harness
            .setup
            .confirm_setup(account_id, &valid_code(&bundle.secret))
            .await
            .unwrap();

        harness
            .verify
            .verify_login(account_id, CodeKind::Totp, &valid_code(&bundle.secret))
            .await
            .unwrap();

        harness
            .verify
            .verify_login(account_id, CodeKind::Backup, &bundle.backup_codes[0])
            .await
            .unwrap();

        let result = harness
            .verify
            .verify_login(account_id, CodeKind::Backup, &bundle.backup_codes[0])
            .await;
        assert!(matches!(result, Err(AppError::TotpInvalid)));
    }
}
