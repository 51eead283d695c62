use tokio::task;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::PendingSetup;
use crate::repositories::{PendingSetupStore, TwoFactorRepository};
use crate::services::provisioning::{self, ProvisioningService};
use crate::services::{TotpService, backup_codes, secret, totp};

/// begin_setup の結果
///
/// secret と backup_codes はこのレスポンスで一度だけユーザーへ表示される。
pub struct SetupBundle {
    pub secret: String,
    pub provisioning_uri: String,
    pub qr_png: Vec<u8>,
    pub backup_codes: Vec<String>,
}

/// 二要素認証設定のライフサイクル管理サービス
///
/// 状態遷移: NO_SETUP → PENDING → CONFIRMED。
/// PENDING は confirm 失敗では維持され（再試行可能）、
/// TTL超過または disable で破棄される。
#[derive(Clone)]
pub struct SetupService<R> {
    repo: R,
    pending_store: PendingSetupStore,
    totp_service: TotpService,
    provisioning_service: ProvisioningService,
}

impl<R: TwoFactorRepository> SetupService<R> {
    /// 新しい SetupService を作成
    pub fn new(
        repo: R,
        pending_store: PendingSetupStore,
        totp_service: TotpService,
        provisioning_service: ProvisioningService,
    ) -> Self {
        Self {
            repo,
            pending_store,
            totp_service,
            provisioning_service,
        }
    }

    /// 二要素認証の設定を開始
    ///
    /// シークレットとバックアップコードを生成し、確認待ち状態として
    /// 保存する。同一アカウントの既存の確認待ち設定は上書きされる
    /// （同時に進行できる設定は1つだけ）。
    ///
    /// # Security
    /// - シークレット・コード平文はログ出力禁止
    pub async fn begin_setup(
        &self,
        account_id: Uuid,
        account_label: &str,
    ) -> Result<SetupBundle, AppError> {
        // 既に有効化済みかチェック
        if let Some(state) = self.repo.find_by_account_id(account_id).await? {
            if state.enabled {
                return Err(AppError::TotpAlreadyEnabled);
            }
        }

        let shared_secret = secret::generate_secret();

        // argon2ハッシュ生成はCPU負荷が高いため blocking スレッドで実行
        let (codes, hashes) = task::spawn_blocking(backup_codes::generate_set)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "バックアップコード生成タスクの失敗");
                AppError::Internal(anyhow::anyhow!("backup code generation task failed"))
            })??;

        self.pending_store
            .save(account_id, PendingSetup::new(shared_secret.clone(), hashes));

        let provisioning_uri = self
            .provisioning_service
            .build_uri(&shared_secret, account_label);
        let qr_png = provisioning::render_qr(&provisioning_uri)?;

        tracing::info!(account_id = %account_id, "二要素認証設定開始");

        Ok(SetupBundle {
            secret: shared_secret,
            provisioning_uri,
            qr_png,
            backup_codes: codes,
        })
    }

    /// 初回コードを検証して設定を確定
    ///
    /// 成功時: 暗号化したシークレットとコードハッシュを永続化し、
    /// 確認待ち設定を削除する。
    /// 失敗時: 確認待ち設定はそのまま残る（同じシークレットで再試行可能）。
    pub async fn confirm_setup(&self, account_id: Uuid, code: &str) -> Result<(), AppError> {
        let pending = self
            .pending_store
            .load(account_id)
            .ok_or(AppError::NoSetupInProgress)?;

        if !totp::verify_code(&pending.secret, code)? {
            tracing::warn!(account_id = %account_id, "確認コード不一致（再試行可能）");
            return Err(AppError::TotpInvalid);
        }

        let encrypted = self.totp_service.encrypt_secret(&pending.secret)?;
        self.repo
            .enable(account_id, &encrypted, &pending.backup_code_hashes)
            .await?;
        self.pending_store.delete(account_id);

        tracing::info!(account_id = %account_id, "二要素認証有効化完了");

        Ok(())
    }

    /// 二要素認証を無効化
    ///
    /// # Note
    /// プライマリ認証の再確認は呼び出し側の責務。
    pub async fn disable(&self, account_id: Uuid) -> Result<(), AppError> {
        let state = self
            .repo
            .find_by_account_id(account_id)
            .await?
            .ok_or(AppError::TotpNotEnabled)?;

        if !state.enabled {
            return Err(AppError::TotpNotEnabled);
        }

        self.repo.disable(account_id).await?;
        self.pending_store.delete(account_id);

        tracing::info!(account_id = %account_id, "二要素認証無効化完了");

        Ok(())
    }

    /// バックアップコードを再生成
    ///
    /// 旧コードは未使用分も含めて即座に無効になる。
    /// 新しい平文コードはこの戻り値で一度だけ表示される。
    pub async fn regenerate_backup_codes(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<String>, AppError> {
        let state = self
            .repo
            .find_by_account_id(account_id)
            .await?
            .ok_or(AppError::TotpNotEnabled)?;

        if !state.enabled {
            return Err(AppError::TotpNotEnabled);
        }

        let (codes, hashes) = task::spawn_blocking(backup_codes::generate_set)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "バックアップコード生成タスクの失敗");
                AppError::Internal(anyhow::anyhow!("backup code generation task failed"))
            })??;

        self.repo.replace_backup_codes(account_id, &hashes).await?;

        tracing::info!(account_id = %account_id, "バックアップコード再生成完了");

        Ok(codes)
    }
}
