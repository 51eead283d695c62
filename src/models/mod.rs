pub mod pending_setup;
pub mod two_factor;

pub use pending_setup::PendingSetup;
pub use two_factor::{AccountTwoFactor, BackupCodeHash};
