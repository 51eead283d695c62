use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AccountTwoFactor, BackupCodeHash};

/// 二要素認証状態の永続ストア
///
/// 永続化技術を抽象化するためのインターフェース。
/// 本番では [`PgTwoFactorRepository`]、テストでは
/// [`crate::repositories::InMemoryTwoFactorRepository`] を使う。
///
/// # Note
/// `enable` / `replace_backup_codes` はアカウント単位でアトミックに
/// 実行されること（途中状態が他のリクエストから観測されてはならない）。
#[allow(async_fn_in_trait)]
pub trait TwoFactorRepository: Clone + Send + Sync {
    /// アカウントIDで二要素認証状態を検索
    async fn find_by_account_id(
        &self,
        account_id: Uuid,
    ) -> Result<Option<AccountTwoFactor>, AppError>;

    /// 二要素認証を有効化（状態とバックアップコードハッシュを一括保存）
    async fn enable(
        &self,
        account_id: Uuid,
        secret_encrypted: &[u8],
        code_hashes: &[String],
    ) -> Result<(), AppError>;

    /// 二要素認証を無効化（状態とバックアップコードハッシュを全削除）
    async fn disable(&self, account_id: Uuid) -> Result<(), AppError>;

    /// 未使用のバックアップコードハッシュを列挙
    async fn find_unused_backup_codes(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<BackupCodeHash>, AppError>;

    /// バックアップコードを使用済みにする
    ///
    /// used = false の場合のみ成功し true を返す（条件付き更新）。
    /// 並行リクエストが同じコードを二重消費することを防ぐ。
    async fn consume_backup_code(&self, account_id: Uuid, code_id: Uuid)
    -> Result<bool, AppError>;

    /// バックアップコードハッシュを一括置換
    ///
    /// 旧ハッシュは未使用分も含めて即座に検証不能になる。
    async fn replace_backup_codes(
        &self,
        account_id: Uuid,
        code_hashes: &[String],
    ) -> Result<(), AppError>;
}

/// PostgreSQL 実装
#[derive(Clone)]
pub struct PgTwoFactorRepository {
    pool: PgPool,
}

impl PgTwoFactorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TwoFactorRepository for PgTwoFactorRepository {
    async fn find_by_account_id(
        &self,
        account_id: Uuid,
    ) -> Result<Option<AccountTwoFactor>, AppError> {
        let state = sqlx::query_as::<_, AccountTwoFactor>(
            r#"
            SELECT account_id, secret_encrypted, enabled, created_at, updated_at
            FROM account_two_factor
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    async fn enable(
        &self,
        account_id: Uuid,
        secret_encrypted: &[u8],
        code_hashes: &[String],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO account_two_factor (account_id, secret_encrypted, enabled)
            VALUES ($1, $2, true)
            ON CONFLICT (account_id)
            DO UPDATE SET secret_encrypted = EXCLUDED.secret_encrypted,
                          enabled = true,
                          updated_at = NOW()
            "#,
        )
        .bind(account_id)
        .bind(secret_encrypted)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM two_factor_backup_codes
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        for code_hash in code_hashes {
            sqlx::query(
                r#"
                INSERT INTO two_factor_backup_codes (account_id, code_hash)
                VALUES ($1, $2)
                "#,
            )
            .bind(account_id)
            .bind(code_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn disable(&self, account_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM two_factor_backup_codes
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM account_two_factor
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn find_unused_backup_codes(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<BackupCodeHash>, AppError> {
        let codes = sqlx::query_as::<_, BackupCodeHash>(
            r#"
            SELECT id, account_id, code_hash, used, used_at, created_at
            FROM two_factor_backup_codes
            WHERE account_id = $1 AND used = false
            ORDER BY created_at
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }

    async fn consume_backup_code(
        &self,
        account_id: Uuid,
        code_id: Uuid,
    ) -> Result<bool, AppError> {
        // used = false の行だけを更新する条件付きUPDATE。
        // 並行する2リクエストのうち片方だけが rows_affected = 1 を得る。
        let result = sqlx::query(
            r#"
            UPDATE two_factor_backup_codes
            SET used = true, used_at = NOW()
            WHERE id = $1 AND account_id = $2 AND used = false
            "#,
        )
        .bind(code_id)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_backup_codes(
        &self,
        account_id: Uuid,
        code_hashes: &[String],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM two_factor_backup_codes
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        for code_hash in code_hashes {
            sqlx::query(
                r#"
                INSERT INTO two_factor_backup_codes (account_id, code_hash)
                VALUES ($1, $2)
                "#,
            )
            .bind(account_id)
            .bind(code_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }
}
