//! Escrow state machine for freelance engagements
//!
//! This crate mediates a client/freelancer engagement with funds held in
//! custody and released only against verified milestone completion:
//! - Project/bid/milestone lifecycle with strict state-transition checks
//! - Checked fund accounting (no silent wraparound)
//! - Reentrancy-guarded value release through a pluggable ledger adapter

pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod models;
pub mod store;

use error::EscrowError;

/// Result type alias for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
