pub mod backup_codes;
pub mod provisioning;
pub mod secret;
pub mod setup;
pub mod totp;
pub mod verify;

pub use provisioning::ProvisioningService;
pub use setup::{SetupBundle, SetupService};
pub use totp::TotpService;
pub use verify::{CodeKind, VerificationService};
