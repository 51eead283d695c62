use time::OffsetDateTime;

/// 確認待ちの二要素認証設定
///
/// confirm 成功または放棄（TTL超過）まで生存する一時レコード。
/// 永続ストレージには保存せず、プロセス内キャッシュにのみ置く。
#[derive(Debug, Clone)]
pub struct PendingSetup {
    /// Base32エンコード済みの共有シークレット（平文、ログ出力禁止）
    pub secret: String,
    /// バックアップコードのargon2idハッシュ（平文は呼び出し側で一度だけ表示）
    pub backup_code_hashes: Vec<String>,
    pub created_at: OffsetDateTime,
}

impl PendingSetup {
    pub fn new(secret: String, backup_code_hashes: Vec<String>) -> Self {
        Self {
            secret,
            backup_code_hashes,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
