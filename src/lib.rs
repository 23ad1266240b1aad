pub mod browser;
pub mod challenge;
pub mod config;
pub mod credential;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod poll;
pub mod registry;
pub mod renewal;
pub mod resource;
pub mod run;
pub mod session;
pub mod token_store;
pub mod verify;

pub use config::Config;
pub use credential::Credential;
pub use error::{AuthFailure, Error, Result};
pub use run::{run, RunResult, RunStatus};
pub use token_store::SessionToken;
