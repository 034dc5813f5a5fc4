//! The product stages.
//!
//! Layout stages record everything they create; their destroy halves
//! remove what the persisted manifest assigns to them (see
//! [`classify`](super::classify)).

mod configuration;
mod finalization;
mod infrastructure;
mod instance;
mod security_databases;
mod selinux;
mod slot_substitution;
mod subsystem;

pub use configuration::{Configuration, build_configuration_request};
pub use finalization::Finalization;
pub use infrastructure::Infrastructure;
pub use instance::Instance;
pub use security_databases::SecurityDatabases;
pub use selinux::{Selinux, policy_script};
pub use slot_substitution::SlotSubstitution;
pub use subsystem::Subsystem;
