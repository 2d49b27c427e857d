//! Command execution for the device agent
//!
//! This module handles:
//! - Validating commands received from the broker
//! - Dispatching to the handler for each function
//! - Routing the answer as a direct reply or an ingested report

mod executor;
pub mod handlers;

pub use executor::{CommandExecutor, CommandResult, Outcome};
