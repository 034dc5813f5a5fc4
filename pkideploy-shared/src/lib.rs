//! PKI Deploy shared definitions.
//!
//! This crate contains the error taxonomy and product constants used by
//! both the deployment engine (pkideploy) and its command-line front end.

pub mod constants;
pub mod errors;

pub use errors::{Criticality, DeployError, DeployResult};
