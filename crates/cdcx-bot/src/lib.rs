//! cdcx-arb application.
//!
//! Wires the crates together behind five commands:
//! - `pairs`: discover markets and save candidate groups
//! - `detect`: top-of-book opportunity detection
//! - `depth`: order-book depth analysis of viable opportunities
//! - `execute`: serialized execution of saved opportunities
//! - `live`: continuous detect-and-execute loop

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, Credentials};
pub use error::{AppError, AppResult};
