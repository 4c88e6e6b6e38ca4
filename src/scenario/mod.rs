//! Replay of the presale/vesting integration run against the in-memory
//! engine: fund and buy twice, lock for self, lock for a second account,
//! then enumerate the vestors.

use leaf_core::{Address, Amount, SettlementResult};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NetworkProfile;
use crate::engine::{DeploymentAddresses, DeploymentParams, SettlementEngine};
use crate::token::LEAF_INITIAL_SUPPLY;
use crate::vesting::VestingEntry;

/// Tokens moved into the presale before each purchase (10e11).
pub const PRESALE_TOP_UP: Amount = 1_000_000_000_000;
/// Native payment per purchase: 0.0000000000000001 ether.
pub const PURCHASE_WEI: Amount = 100;
/// Tokens locked by each lock step.
pub const LOCK_AMOUNT: Amount = 1_000;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayStep {
    pub action: String,
    pub owner_balance: Amount,
    pub presale_inventory: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayReport {
    pub owner: Address,
    pub second: Address,
    pub addresses: DeploymentAddresses,
    pub steps: Vec<ReplayStep>,
    pub vestors: Vec<VestingEntry>,
    pub vesting_root: String,
}

/// Two signer addresses drawn from `seed`, owner first.
pub fn signers(seed: u64) -> (Address, Address) {
    let mut rng = StdRng::seed_from_u64(seed);
    (Address::new(rng.gen()), Address::new(rng.gen()))
}

pub fn run(profile: &NetworkProfile, owner: Address, second: Address) -> SettlementResult<ReplayReport> {
    let mut engine = SettlementEngine::deploy(&DeploymentParams {
        deployer: owner,
        token_supply: LEAF_INITIAL_SUPPLY,
        min_accept_amount: profile.min_accept_wei,
        leaf_per_wei: profile.leaf_per_wei,
    });
    let mut steps = Vec::new();
    let mut record = |engine: &SettlementEngine, action: &str| {
        let step = ReplayStep {
            action: action.to_string(),
            owner_balance: engine.balance_of(&owner),
            presale_inventory: engine.presale_inventory(),
        };
        info!(action, owner_balance = step.owner_balance, inventory = step.presale_inventory, "replay step");
        steps.push(step);
    };

    record(&engine, "deploy");
    for round in 1..=2 {
        engine.fund_presale(&owner, PRESALE_TOP_UP)?;
        record(&engine, &format!("fund presale #{round}"));
        engine.buy(&owner, PURCHASE_WEI)?;
        record(&engine, &format!("buy #{round}"));
    }

    engine.lock(&owner, LOCK_AMOUNT)?;
    record(&engine, "lock to self");
    engine.lock_to(&owner, &[second], &[LOCK_AMOUNT])?;
    record(&engine, "lock to other");

    let vesting = engine.vesting();
    let vestors = vesting.vesting_info(0, vesting.vestor_count())?;
    Ok(ReplayReport {
        owner,
        second,
        addresses: engine.addresses(),
        steps,
        vestors,
        vesting_root: vesting.snapshot().merkle_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signers_are_deterministic_per_seed() {
        assert_eq!(signers(3), signers(3));
        assert_ne!(signers(3), signers(4));
        let (owner, second) = signers(0);
        assert_ne!(owner, second);
    }
}
