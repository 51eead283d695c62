use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{PendingSetupStore, PgTwoFactorRepository};
use crate::services::{ProvisioningService, SetupService, TotpService, VerificationService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 二要素認証設定ライフサイクルサービス
    pub setup_service: SetupService<PgTwoFactorRepository>,
    /// ログイン時二次認証サービス
    pub verification_service: VerificationService<PgTwoFactorRepository>,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);
        let repo = PgTwoFactorRepository::new(db_pool.clone());
        let totp_service = TotpService::new(config.encryption_key.expose_secret())?;
        let pending_store = PendingSetupStore::new(config.pending_setup_ttl_secs);
        let provisioning_service = ProvisioningService::new(config.totp_issuer.clone());

        let setup_service = SetupService::new(
            repo.clone(),
            pending_store,
            totp_service.clone(),
            provisioning_service,
        );
        let verification_service = VerificationService::new(repo, totp_service);

        Ok(Self {
            db_pool,
            config,
            setup_service,
            verification_service,
        })
    }
}
