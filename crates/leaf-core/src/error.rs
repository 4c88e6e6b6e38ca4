use thiserror::Error;

use crate::address::{Address, Amount};

/// Canonical error type exposed by the settlement components.
///
/// Every variant describes a call that was rejected as a whole: no ledger,
/// registry or token balance is changed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Batch-lock payload could not be decoded, or its arrays differ in length.
    #[error("malformed lock payload: {0}")]
    MalformedPayload(String),

    /// Per-recipient amounts do not add up to the tokens actually transferred.
    #[error("payload declares {declared} tokens but {transferred} were transferred")]
    AmountMismatch { declared: Amount, transferred: Amount },

    /// Registry query beyond the number of known vestors.
    #[error("index {index} out of range for {len} vestors")]
    IndexOutOfRange { index: usize, len: usize },

    /// Payment smaller than the presale floor.
    #[error("payment of {amount} wei is below the minimum of {minimum} wei")]
    BelowMinimum { amount: Amount, minimum: Amount },

    /// Integer overflow while computing an allocation or a running balance.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// Allocation larger than the tokens held by the presale.
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: Amount, available: Amount },

    /// Token transfer from an account that does not hold enough tokens.
    #[error("insufficient balance in {account}: have {have}, need {need}")]
    InsufficientBalance {
        account: Address,
        have: Amount,
        need: Amount,
    },

    /// Transfer hook invoked by a token the receiver was not wired to.
    #[error("hook invoked by unexpected token {0}")]
    UnauthorizedToken(Address),

    /// A thread panicked while holding the shared engine lock.
    #[error("settlement engine lock poisoned")]
    EnginePoisoned,

    /// Text that does not parse as a 20-byte hex address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
