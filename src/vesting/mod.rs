//! Long-term vesting ledger.
//!
//! Tokens only ever enter the ledger through the token's transfer hook, so
//! every locked unit is backed by a real transfer into the ledger's custody.
//! Locks accumulate; there is no release path.

use std::collections::{BTreeMap, HashMap};

use leaf_core::{
    abi::decode_lock_payload,
    merkle::{BalanceProof, BalanceTree},
    Address, Amount, SettlementError, SettlementResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::token::{Delivery, TokenReceiver};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VestingEntry {
    pub recipient: Address,
    pub locked_amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VestingEvent {
    Locked {
        sender: Address,
        recipient: Address,
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VestingSnapshot {
    pub address: Address,
    pub token: Address,
    pub entries: Vec<VestingEntry>,
    pub total_locked: Amount,
    pub merkle_root: String,
}

/// Per-recipient locked balances plus the insertion-ordered vestor registry.
#[derive(Clone, Debug)]
pub struct VestingLedger {
    address: Address,
    token: Address,
    vestors: Vec<Address>,
    locked: HashMap<Address, Amount>,
    total_locked: Amount,
    events: Vec<VestingEvent>,
}

impl VestingLedger {
    /// Ledger deployed at `address`, accepting hooks from `token` only.
    pub fn new(address: Address, token: Address) -> Self {
        Self {
            address,
            token,
            vestors: Vec::new(),
            locked: HashMap::new(),
            total_locked: 0,
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn vestor_count(&self) -> usize {
        self.vestors.len()
    }

    pub fn vestor_at(&self, index: usize) -> SettlementResult<Address> {
        self.vestors
            .get(index)
            .copied()
            .ok_or(SettlementError::IndexOutOfRange {
                index,
                len: self.vestors.len(),
            })
    }

    /// Entries for registry positions `[start, start + count)`.
    pub fn vesting_info(&self, start: usize, count: usize) -> SettlementResult<Vec<VestingEntry>> {
        let len = self.vestors.len();
        let end = start
            .checked_add(count)
            .filter(|end| *end <= len)
            .ok_or(SettlementError::IndexOutOfRange {
                index: start.saturating_add(count),
                len,
            })?;
        Ok(self.vestors[start..end]
            .iter()
            .map(|recipient| VestingEntry {
                recipient: *recipient,
                locked_amount: self.locked_of(recipient),
            })
            .collect())
    }

    /// Locked balance of `recipient`, zero if it never received a lock.
    pub fn locked_of(&self, recipient: &Address) -> Amount {
        self.locked.get(recipient).copied().unwrap_or(0)
    }

    pub fn total_locked(&self) -> Amount {
        self.total_locked
    }

    pub fn events(&self) -> &[VestingEvent] {
        &self.events
    }

    pub fn snapshot(&self) -> VestingSnapshot {
        let entries: Vec<VestingEntry> = self
            .vestors
            .iter()
            .map(|recipient| VestingEntry {
                recipient: *recipient,
                locked_amount: self.locked_of(recipient),
            })
            .collect();
        VestingSnapshot {
            address: self.address,
            token: self.token,
            merkle_root: self.balance_tree().root_hex(),
            total_locked: self.total_locked,
            entries,
        }
    }

    /// Inclusion proof for the vestor at `index` against the snapshot root.
    pub fn prove_entry(&self, index: usize) -> SettlementResult<BalanceProof> {
        self.balance_tree().proof(&[index])
    }

    fn balance_tree(&self) -> BalanceTree {
        BalanceTree::from_balances(
            self.vestors
                .iter()
                .map(|recipient| (recipient, self.locked_of(recipient))),
        )
    }

    /// Turn a hook call into validated `(recipient, amount)` pairs.
    fn plan_locks(
        sender: &Address,
        amount: Amount,
        payload: &[u8],
    ) -> SettlementResult<Vec<(Address, Amount)>> {
        if payload.is_empty() {
            return Ok(vec![(*sender, amount)]);
        }
        let (recipients, amounts) = decode_lock_payload(payload)?;
        let declared = amounts
            .iter()
            .try_fold(0 as Amount, |acc, a| acc.checked_add(*a))
            .ok_or(SettlementError::ArithmeticOverflow)?;
        if declared != amount {
            return Err(SettlementError::AmountMismatch {
                declared,
                transferred: amount,
            });
        }
        Ok(recipients.into_iter().zip(amounts).collect())
    }

    /// Validate every addition against current balances before touching any.
    fn apply_locks(&mut self, sender: &Address, plan: Vec<(Address, Amount)>) -> SettlementResult<()> {
        let mut staged: BTreeMap<Address, Amount> = BTreeMap::new();
        for (recipient, amount) in &plan {
            let current = match staged.get(recipient) {
                Some(v) => *v,
                None => self.locked_of(recipient),
            };
            let next = current
                .checked_add(*amount)
                .ok_or(SettlementError::ArithmeticOverflow)?;
            staged.insert(*recipient, next);
        }
        let added: Amount = plan.iter().map(|(_, a)| *a).sum();
        let total = self
            .total_locked
            .checked_add(added)
            .ok_or(SettlementError::ArithmeticOverflow)?;

        for (recipient, amount) in plan {
            if !self.locked.contains_key(&recipient) {
                self.vestors.push(recipient);
            }
            self.locked.insert(recipient, staged[&recipient]);
            self.events.push(VestingEvent::Locked {
                sender: *sender,
                recipient,
                amount,
            });
        }
        self.total_locked = total;
        Ok(())
    }
}

impl TokenReceiver for VestingLedger {
    fn receiver_address(&self) -> Address {
        self.address
    }

    fn on_token_received(&mut self, delivery: &Delivery, payload: &[u8]) -> SettlementResult<()> {
        let token = delivery.token();
        let sender = delivery.sender();
        let amount = delivery.amount();
        if token != self.token {
            warn!(%token, expected = %self.token, "lock hook from foreign token");
            return Err(SettlementError::UnauthorizedToken(token));
        }
        let plan = Self::plan_locks(&sender, amount, payload).map_err(|err| {
            warn!(%sender, amount, error = %err, "lock rejected");
            err
        })?;
        let recipients = plan.len();
        self.apply_locks(&sender, plan)?;
        debug!(%sender, amount, recipients, vestors = self.vestors.len(), "tokens locked");
        Ok(())
    }
}
