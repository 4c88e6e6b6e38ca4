//! Core primitives for the Leaf settlement stack.
//!
//! This crate exposes the building blocks that the vesting ledger, the
//! presale and the CLI share:
//!
//! * [`address`] — 20-byte account identifiers and the `Amount` unit.
//! * [`abi`] — the `(address[], uint256[])` batch-lock payload codec.
//! * [`merkle`] — Blake3 backed Merkle roots and inclusion proofs over
//!   ledger entries.
//!
//! Everything here is deterministic and free of I/O so that the settlement
//! components can be replayed and compared byte for byte.

pub mod abi;
pub mod address;
pub mod merkle;

mod error;

pub use address::{Address, Amount};
pub use error::SettlementError;

/// Result alias used across the settlement components.
pub type SettlementResult<T> = Result<T, SettlementError>;
