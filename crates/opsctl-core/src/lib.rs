pub mod config;
pub mod error;
pub mod hosts;
pub mod io;
pub mod ledger;
pub mod paths;
pub mod recap;
pub mod registry;
pub mod run;

pub use error::{OpsError, Result};
