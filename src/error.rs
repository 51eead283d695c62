use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("認証コードが無効です")]
    TotpInvalid,

    #[error("二要素認証は既に有効です")]
    TotpAlreadyEnabled,

    #[error("二要素認証が有効化されていません")]
    TotpNotEnabled,

    #[error("進行中の二要素認証設定がありません")]
    NoSetupInProgress,
}

/// エラーレスポンス
///
/// `error` は機械可読のエラーコード（UI側の分岐用）、
/// `message` は人間向けメッセージ。
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::TotpInvalid => (
                StatusCode::UNAUTHORIZED,
                "invalid_code",
                "認証コードが正しくありません".to_string(),
            ),
            Self::TotpAlreadyEnabled => (
                StatusCode::CONFLICT,
                "already_enabled",
                "二要素認証は既に有効です".to_string(),
            ),
            Self::TotpNotEnabled => (
                StatusCode::BAD_REQUEST,
                "not_enabled",
                "二要素認証が有効化されていません".to_string(),
            ),
            Self::NoSetupInProgress => (
                StatusCode::BAD_REQUEST,
                "no_setup",
                "進行中の二要素認証設定がありません".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: code, message })).into_response()
    }
}
