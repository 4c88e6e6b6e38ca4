//! LEAF settlement engine.
//!
//! * [`token`] — balance/transfer capability and the in-memory LEAF token.
//! * [`vesting`] — long-term vesting ledger fed by the transfer hook.
//! * [`presale`] — fixed-rate presale settled against held inventory.
//! * [`engine`] — the three components wired together, plus a thread-safe
//!   wrapper.
//! * [`config`] — per-network deployment profiles.
//! * [`scenario`] — replay of the integration run.

pub mod config;
pub mod engine;
pub mod presale;
pub mod scenario;
pub mod token;
pub mod vesting;

pub use leaf_core::{abi, Address, Amount, SettlementError, SettlementResult};
