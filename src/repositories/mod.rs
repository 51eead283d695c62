pub mod memory;
pub mod pending_setup;
pub mod two_factor;

pub use memory::InMemoryTwoFactorRepository;
pub use pending_setup::PendingSetupStore;
pub use two_factor::{PgTwoFactorRepository, TwoFactorRepository};
