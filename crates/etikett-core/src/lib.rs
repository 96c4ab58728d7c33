// SPDX-License-Identifier: MIT
//
// Etikett — Core types, errors, and configuration shared across all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::AgentConfig;
pub use error::EtikettError;
pub use types::*;
