use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::Rng;

use crate::error::AppError;

/// 1回の生成で発行するコード数
pub const CODE_COUNT: usize = 10;
/// コードの文字数
pub const CODE_LENGTH: usize = 8;
/// コードに使う36種の記号（英大文字 + 数字）
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// バックアップコード一式を生成
///
/// # Returns
/// (平文リスト, argon2idハッシュリスト)。平文はユーザーへ一度だけ
/// 表示し、保存するのはハッシュのみ。
///
/// # Note
/// argon2ハッシュはCPU負荷が高いため、リクエストパスで呼ぶ場合は
/// spawn_blocking 経由で実行すること。
pub fn generate_set() -> Result<(Vec<String>, Vec<String>), AppError> {
    let mut codes = Vec::with_capacity(CODE_COUNT);
    let mut hashes = Vec::with_capacity(CODE_COUNT);

    for _ in 0..CODE_COUNT {
        let code = generate_code();
        hashes.push(hash_code(&code)?);
        codes.push(code);
    }

    Ok((codes, hashes))
}

/// 8文字のランダムコードを生成
///
/// 各文字を36種のアルファベットから独立・一様に抽選する。
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// バックアップコードをargon2idでハッシュ化（コードごとにランダムソルト）
pub fn hash_code(code: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(code.as_bytes(), &salt).map_err(|e| {
        tracing::error!(error = ?e, "バックアップコードハッシュ生成エラー");
        AppError::Internal(anyhow::anyhow!("backup code hash error"))
    })?;
    Ok(hash.to_string())
}

/// バックアップコードをハッシュと照合
///
/// 比較はargon2の検証器に任せる（内部で定数時間比較）。
/// 不正な形式の入力も同じ検証経路を通るため、形式エラーと
/// 不一致をタイミングで区別できない。
pub fn verify_code(code: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(e) => {
            // 保存済みハッシュが壊れている場合のみ到達する
            tracing::error!(error = ?e, "バックアップコードハッシュのパースエラー");
            return false;
        }
    };

    Argon2::default()
        .verify_password(code.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_set_count_and_format() {
        let (codes, hashes) = generate_set().unwrap();

        assert_eq!(codes.len(), CODE_COUNT);
        assert_eq!(hashes.len(), CODE_COUNT);

        for code in &codes {
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(
                code.bytes().all(|b| CODE_ALPHABET.contains(&b)),
                "アルファベット外の文字: {code}"
            );
        }
    }

    #[test]
    fn test_generate_set_is_unique() {
        let (first, _) = generate_set().unwrap();
        let (second, _) = generate_set().unwrap();

        // 36^8 通りのため、独立した2回の生成で重複はまず起きない
        for code in &first {
            assert!(!second.contains(code));
        }
    }

    #[test]
    fn test_hash_verify_roundtrip() {
        let (codes, hashes) = generate_set().unwrap();

        assert!(verify_code(&codes[0], &hashes[0]));
        // 別のコードのハッシュとは一致しない
        assert!(!verify_code(&codes[0], &hashes[1]));
    }

    #[test]
    fn test_verify_rejects_single_character_mutation() {
        let code = "A1B2C3D4";
        let hash = hash_code(code).unwrap();
        assert!(verify_code(code, &hash));

        // 1文字だけ変えたコードは全て不一致
        let mutated = "Z1B2C3D4";
        assert!(!verify_code(mutated, &hash));
        let mutated = "A1B2C3D9";
        assert!(!verify_code(mutated, &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_input() {
        let hash = hash_code("A1B2C3D4").unwrap();

        // 形式不正でもエラーにはせず false を返す（検証経路は同一）
        assert!(!verify_code("", &hash));
        assert!(!verify_code("short", &hash));
        assert!(!verify_code("a1b2c3d4", &hash));
    }

    #[test]
    fn test_verify_rejects_corrupt_stored_hash() {
        assert!(!verify_code("A1B2C3D4", "not-a-phc-string"));
    }
}
