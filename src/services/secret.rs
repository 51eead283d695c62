use data_encoding::BASE32_NOPAD;
use rand::RngCore;

/// デフォルトのシークレット長（バイト）
///
/// 10バイト = 80ビット = Base32で16文字。RFC 4226 が要求する最低限。
pub const DEFAULT_SECRET_LEN_BYTES: usize = 10;

/// ランダムな共有シークレットを生成し、Base32（パディングなし）でエンコード
pub fn generate_secret() -> String {
    generate_secret_with_length(DEFAULT_SECRET_LEN_BYTES)
}

/// 指定バイト数のランダムシークレットを生成
///
/// エントロピー源は thread_rng（CSPRNG）。枯渇時は panic する（致命的エラー扱い）。
pub fn generate_secret_with_length(len_bytes: usize) -> String {
    let mut bytes = vec![0u8; len_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}
