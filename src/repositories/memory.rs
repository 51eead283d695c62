use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AccountTwoFactor, BackupCodeHash};
use crate::repositories::TwoFactorRepository;

#[derive(Debug, Clone)]
struct AccountRecord {
    state: AccountTwoFactor,
    codes: Vec<BackupCodeHash>,
}

/// インメモリ実装
///
/// 単体テストおよびデモ起動用。プロセスローカルなため
/// 複数インスタンス構成では使用しないこと。
#[derive(Clone, Default)]
pub struct InMemoryTwoFactorRepository {
    accounts: Arc<RwLock<HashMap<Uuid, AccountRecord>>>,
}

impl InMemoryTwoFactorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TwoFactorRepository for InMemoryTwoFactorRepository {
    async fn find_by_account_id(
        &self,
        account_id: Uuid,
    ) -> Result<Option<AccountTwoFactor>, AppError> {
        let accounts = self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(accounts.get(&account_id).map(|r| r.state.clone()))
    }

    async fn enable(
        &self,
        account_id: Uuid,
        secret_encrypted: &[u8],
        code_hashes: &[String],
    ) -> Result<(), AppError> {
        let now = OffsetDateTime::now_utc();
        let record = AccountRecord {
            state: AccountTwoFactor {
                account_id,
                secret_encrypted: secret_encrypted.to_vec(),
                enabled: true,
                created_at: now,
                updated_at: now,
            },
            codes: code_hashes
                .iter()
                .map(|code_hash| BackupCodeHash {
                    id: Uuid::new_v4(),
                    account_id,
                    code_hash: code_hash.clone(),
                    used: false,
                    used_at: None,
                    created_at: now,
                })
                .collect(),
        };

        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        accounts.insert(account_id, record);

        Ok(())
    }

    async fn disable(&self, account_id: Uuid) -> Result<(), AppError> {
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        accounts.remove(&account_id);

        Ok(())
    }

    async fn find_unused_backup_codes(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<BackupCodeHash>, AppError> {
        let accounts = self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let codes = accounts
            .get(&account_id)
            .map(|r| r.codes.iter().filter(|c| !c.used).cloned().collect())
            .unwrap_or_default();

        Ok(codes)
    }

    async fn consume_backup_code(
        &self,
        account_id: Uuid,
        code_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(record) = accounts.get_mut(&account_id) else {
            return Ok(false);
        };

        match record.codes.iter_mut().find(|c| c.id == code_id && !c.used) {
            Some(code) => {
                code.used = true;
                code.used_at = Some(OffsetDateTime::now_utc());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_backup_codes(
        &self,
        account_id: Uuid,
        code_hashes: &[String],
    ) -> Result<(), AppError> {
        let now = OffsetDateTime::now_utc();
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(record) = accounts.get_mut(&account_id) else {
            // enabled でないアカウントの置換はサービス層で弾いている
            return Ok(());
        };

        record.codes = code_hashes
            .iter()
            .map(|code_hash| BackupCodeHash {
                id: Uuid::new_v4(),
                account_id,
                code_hash: code_hash.clone(),
                used: false,
                used_at: None,
                created_at: now,
            })
            .collect();

        Ok(())
    }
}
