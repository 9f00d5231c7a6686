//! Action primitives for navigation-reactive flows
//!
//! This crate provides the building blocks every flow step is made of:
//! - The `Page` interface over externally owned page state
//! - A cancellable bounded wait driven by page mutation notifications
//! - Element primitives: click, set value, select option
//! - An in-memory page used by tests and scenario simulation

pub mod errors;
mod memory;
mod primitives;
pub mod types;
mod waiting;

pub use errors::*;
pub use memory::*;
pub use primitives::*;
pub use types::*;
pub use waiting::*;
