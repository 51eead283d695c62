use crate::error::AppError;

/// プロビジョニングURI / QRコード発行サービス
///
/// 認証アプリ（Google Authenticator等）へ共有シークレットを
/// 取り込むための otpauth URI とQRコード画像を生成する。
#[derive(Clone)]
pub struct ProvisioningService {
    issuer: String,
}

impl ProvisioningService {
    /// 新しい ProvisioningService を作成
    ///
    /// # Arguments
    /// * `issuer` - TOTP発行者名（認証アプリに表示される）
    pub fn new(issuer: String) -> Self {
        Self { issuer }
    }

    /// otpauth プロビジョニングURIを構築
    ///
    /// 形式:
    /// `otpauth://totp/{issuer}:{label}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits=6&period=30`
    ///
    /// ラベルと発行者名はパーセントエンコードされる。
    pub fn build_uri(&self, secret: &str, account_label: &str) -> String {
        let issuer = urlencoding::encode(&self.issuer);
        let label = urlencoding::encode(account_label);

        format!(
            "otpauth://totp/{issuer}:{label}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits=6&period=30"
        )
    }
}

/// URIをQRコード画像（PNG）にエンコード
///
/// 誤り訂正レベルは中、ネットワークアクセスなし。
/// 同一入力に対して常に同一のバイト列を返す。
pub fn render_qr(uri: &str) -> Result<Vec<u8>, AppError> {
    qrcodegen_image::draw_png(uri).map_err(|e| {
        tracing::error!(error = %e, "QRコード生成エラー");
        AppError::Internal(anyhow::anyhow!("qr code generation error"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_uri_format() {
        let service = ProvisioningService::new("OtpGate".to_string());
        let uri = service.build_uri("JBSWY3DPEHPK3PXP", "user@example.com");

        assert_eq!(
            uri,
            "otpauth://totp/OtpGate:user%40example.com?secret=JBSWY3DPEHPK3PXP&issuer=OtpGate&algorithm=SHA1&digits=6&period=30"
        );
    }

    #[test]
    fn test_build_uri_encodes_issuer() {
        let service = ProvisioningService::new("Otp Gate".to_string());
        let uri = service.build_uri("JBSWY3DPEHPK3PXP", "alice");

        assert!(uri.starts_with("otpauth://totp/Otp%20Gate:alice?"));
        assert!(uri.contains("&issuer=Otp%20Gate&"));
    }

    #[test]
    fn test_render_qr_returns_png() {
        let service = ProvisioningService::new("OtpGate".to_string());
        let uri = service.build_uri("JBSWY3DPEHPK3PXP", "user@example.com");

        let png = render_qr(&uri).unwrap();
        // PNGマジックバイト
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_render_qr_is_deterministic() {
        let uri = "otpauth://totp/OtpGate:alice?secret=JBSWY3DPEHPK3PXP&issuer=OtpGate&algorithm=SHA1&digits=6&period=30";

        let first = render_qr(uri).unwrap();
        let second = render_qr(uri).unwrap();
        assert_eq!(first, second);
    }
}
