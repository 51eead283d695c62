use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::PendingSetup;

/// 確認待ち設定のプロセス内ストア
///
/// アカウントIDをキーとするTTL付きキャッシュ。
/// 期限切れエントリは読み出し時に遅延削除される。
#[derive(Clone)]
pub struct PendingSetupStore {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<Uuid, PendingSetup>>>,
}

impl PendingSetupStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 確認待ち設定を保存（同一アカウントの既存エントリは上書き）
    pub fn save(&self, account_id: Uuid, pending: PendingSetup) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(account_id, pending);
    }

    /// 確認待ち設定を取得
    ///
    /// TTLを超過したエントリは削除し None を返す。
    pub fn load(&self, account_id: Uuid) -> Option<PendingSetup> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let expired = entries
            .get(&account_id)
            .map(|p| OffsetDateTime::now_utc() - p.created_at > self.ttl)?;

        if expired {
            entries.remove(&account_id);
            tracing::debug!(account_id = %account_id, "期限切れの確認待ち設定を破棄");
            return None;
        }

        entries.get(&account_id).cloned()
    }

    /// 確認待ち設定を削除
    pub fn delete(&self, account_id: Uuid) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(&account_id);
    }
}
