//! Settlement engine: one token, one vesting ledger and one presale wired
//! together the way the deployment scripts wire the three contracts.

use std::sync::{Arc, Mutex};

use leaf_core::{abi::encode_lock_payload, Address, Amount, SettlementError, SettlementResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::presale::{PresaleConfig, PresaleSettlement};
use crate::token::{LeafToken, TokenLedger, TokenSnapshot};
use crate::vesting::{VestingLedger, VestingSnapshot};

/// Parameters of a fresh deployment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentParams {
    pub deployer: Address,
    pub token_supply: Amount,
    pub min_accept_amount: Amount,
    pub leaf_per_wei: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentAddresses {
    pub token: Address,
    pub vesting: Address,
    pub presale: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub addresses: DeploymentAddresses,
    pub token: TokenSnapshot,
    pub vesting: VestingSnapshot,
    pub presale_inventory: Amount,
    pub wei_raised: Amount,
    pub tokens_sold: Amount,
}

#[derive(Clone, Debug)]
pub struct SettlementEngine {
    token: LeafToken,
    vesting: VestingLedger,
    presale: PresaleSettlement,
}

impl SettlementEngine {
    /// Deploy token, vesting and presale in script order; contract
    /// addresses derive from the deployer and a running nonce.
    pub fn deploy(params: &DeploymentParams) -> Self {
        let token_addr = Address::derive(&params.deployer, 0);
        let vesting_addr = Address::derive(&params.deployer, 1);
        let presale_addr = Address::derive(&params.deployer, 2);

        let token = LeafToken::new(token_addr, params.deployer, params.token_supply);
        info!(address = %token_addr, supply = params.token_supply, "deployed LeafToken");
        let vesting = VestingLedger::new(vesting_addr, token_addr);
        info!(address = %vesting_addr, "deployed LeafLongTermVesting");
        let presale = PresaleSettlement::new(
            presale_addr,
            PresaleConfig {
                token: token_addr,
                vesting: vesting_addr,
                min_accept_amount: params.min_accept_amount,
                leaf_per_wei: params.leaf_per_wei,
            },
        );
        info!(
            address = %presale_addr,
            min_accept = params.min_accept_amount,
            leaf_per_wei = params.leaf_per_wei,
            "deployed LeafPresale"
        );
        Self {
            token,
            vesting,
            presale,
        }
    }

    pub fn addresses(&self) -> DeploymentAddresses {
        DeploymentAddresses {
            token: self.token.token_address(),
            vesting: self.vesting.address(),
            presale: self.presale.address(),
        }
    }

    pub fn token(&self) -> &LeafToken {
        &self.token
    }

    pub fn vesting(&self) -> &VestingLedger {
        &self.vesting
    }

    pub fn presale(&self) -> &PresaleSettlement {
        &self.presale
    }

    pub fn balance_of(&self, owner: &Address) -> Amount {
        self.token.balance_of(owner)
    }

    /// Plain token transfer into the presale's inventory.
    pub fn fund_presale(&mut self, from: &Address, amount: Amount) -> SettlementResult<()> {
        let presale = self.presale.address();
        self.token.transfer(from, &presale, amount)
    }

    pub fn presale_inventory(&self) -> Amount {
        self.presale.current_token_balance(&self.token)
    }

    /// Native payment of `wei` from `payer` into the presale.
    pub fn buy(&mut self, payer: &Address, wei: Amount) -> SettlementResult<Amount> {
        self.presale.receive_payment(&mut self.token, payer, wei)
    }

    /// Lock `amount` of the sender's tokens for the sender.
    pub fn lock(&mut self, from: &Address, amount: Amount) -> SettlementResult<()> {
        self.lock_with_payload(from, amount, &[])
    }

    /// Lock tokens for others; the transferred total is the sum of `amounts`.
    pub fn lock_to(&mut self, from: &Address, recipients: &[Address], amounts: &[Amount]) -> SettlementResult<()> {
        let total = amounts
            .iter()
            .try_fold(0 as Amount, |acc, a| acc.checked_add(*a))
            .ok_or(SettlementError::ArithmeticOverflow)?;
        let payload = encode_lock_payload(recipients, amounts);
        self.lock_with_payload(from, total, &payload)
    }

    pub fn lock_with_payload(&mut self, from: &Address, amount: Amount, payload: &[u8]) -> SettlementResult<()> {
        self.token
            .transfer_and_call(from, &mut self.vesting, amount, payload)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            addresses: self.addresses(),
            token: self.token.snapshot(),
            vesting: self.vesting.snapshot(),
            presale_inventory: self.presale_inventory(),
            wei_raised: self.presale.wei_raised(),
            tokens_sold: self.presale.tokens_sold(),
        }
    }
}

/// Engine shared across threads. Each closure passed to [`SharedEngine::with`]
/// runs with exclusive access, so check-then-transfer sequences stay atomic.
#[derive(Clone, Debug)]
pub struct SharedEngine {
    inner: Arc<Mutex<SettlementEngine>>,
}

impl SharedEngine {
    pub fn new(engine: SettlementEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SettlementEngine) -> SettlementResult<R>) -> SettlementResult<R> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| SettlementError::EnginePoisoned)?;
        f(&mut *guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn params(min_accept_amount: Amount, leaf_per_wei: Amount) -> DeploymentParams {
        DeploymentParams {
            deployer: Address::from_label("owner"),
            token_supply: 1_000_000,
            min_accept_amount,
            leaf_per_wei,
        }
    }

    #[test]
    fn direct_then_batch_lock_scenario() {
        let mut engine = SettlementEngine::deploy(&params(0, 1));
        let a = Address::from_label("owner");
        let b = Address::from_label("second");

        engine.lock(&a, 1_000).unwrap();
        assert_eq!(engine.vesting().vesting_info(0, 1).unwrap()[0].locked_amount, 1_000);

        engine.lock_to(&a, &[b], &[500]).unwrap();
        let info = engine.vesting().vesting_info(0, 2).unwrap();
        assert_eq!(info[0].recipient, a);
        assert_eq!(info[0].locked_amount, 1_000);
        assert_eq!(info[1].recipient, b);
        assert_eq!(info[1].locked_amount, 500);
        assert_eq!(engine.vesting().vestor_count(), 2);
        assert_eq!(engine.balance_of(&engine.vesting().address()), 1_500);
        assert_eq!(engine.balance_of(&a), 1_000_000 - 1_500);
    }

    #[test]
    fn mismatched_batch_leaves_token_and_ledger_untouched() {
        let mut engine = SettlementEngine::deploy(&params(0, 1));
        let owner = Address::from_label("owner");
        let payload = encode_lock_payload(&[Address::from_label("x")], &[10]);
        let before = engine.snapshot();
        let err = engine.lock_with_payload(&owner, 11, &payload).unwrap_err();
        assert!(matches!(err, SettlementError::AmountMismatch { .. }));
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn lock_without_funds_fails_before_hook() {
        let mut engine = SettlementEngine::deploy(&params(0, 1));
        let stranger = Address::from_label("stranger");
        let err = engine.lock(&stranger, 1).unwrap_err();
        assert!(matches!(err, SettlementError::InsufficientBalance { .. }));
        assert_eq!(engine.vesting().vestor_count(), 0);
    }

    #[test]
    fn locked_total_always_matches_ledger_custody() {
        let mut engine = SettlementEngine::deploy(&params(0, 1));
        let owner = Address::from_label("owner");
        let second = Address::from_label("second");
        let custody = |engine: &SettlementEngine| engine.balance_of(&engine.vesting().address());

        engine.lock(&owner, 700).unwrap();
        engine.lock_to(&owner, &[second, owner], &[50, 25]).unwrap();
        assert!(engine.lock(&second, 1).is_err());
        let payload = encode_lock_payload(&[second], &[10]);
        assert!(engine.lock_with_payload(&owner, 9, &payload).is_err());
        assert!(engine.lock_with_payload(&owner, 10, &[0xde, 0xad]).is_err());

        assert_eq!(engine.vesting().total_locked(), 775);
        assert_eq!(custody(&engine), engine.vesting().total_locked());
        let entries = engine.vesting().vesting_info(0, 2).unwrap();
        let sum: Amount = entries.iter().map(|e| e.locked_amount).sum();
        assert_eq!(sum, custody(&engine));
    }

    #[test]
    fn shared_engine_never_oversells() {
        let mut engine = SettlementEngine::deploy(&params(1, 10));
        let owner = Address::from_label("owner");
        engine.fund_presale(&owner, 1_000).unwrap();
        let shared = SharedEngine::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let payer = Address::from_label(&format!("payer-{i}"));
                    shared.with(|engine| engine.buy(&payer, 30))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 3);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SettlementError::InsufficientInventory { .. })));
        let inventory = shared.with(|engine| Ok(engine.presale_inventory())).unwrap();
        assert_eq!(inventory, 100);
    }
}
