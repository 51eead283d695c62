pub mod health;
pub mod two_factor;

pub use health::health_check;
pub use two_factor::{confirm_2fa, disable_2fa, regenerate_backup_codes, setup_2fa, verify_2fa};
