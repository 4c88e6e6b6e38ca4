use std::collections::BTreeMap;

use leaf_core::{merkle::BalanceTree, Address, Amount, SettlementError, SettlementResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const LEAF_DECIMALS: u8 = 18;
pub const LEAF_UNIT: Amount = 1_000_000_000_000_000_000; // 1 LEAF = 1e18 minimal units
pub const LEAF_INITIAL_SUPPLY: Amount = 420_000_000_000 * LEAF_UNIT;

/// Balance and transfer capability consumed by the vesting ledger and the presale.
pub trait TokenLedger {
    fn token_address(&self) -> Address;

    fn balance_of(&self, owner: &Address) -> Amount;

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> SettlementResult<()>;
}

/// Receipt for tokens already moved into a receiver by `transfer_and_call`.
///
/// Only the token module can build one, so a receiver handed a `Delivery`
/// knows the amount sits in its custody.
///
/// ```compile_fail
/// use leaf_settle::{token::Delivery, Address};
///
/// let forged = Delivery::new(Address::ZERO, Address::ZERO, 1_000);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    token: Address,
    sender: Address,
    amount: Amount,
}

impl Delivery {
    pub(crate) fn new(token: Address, sender: Address, amount: Amount) -> Self {
        Self {
            token,
            sender,
            amount,
        }
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }
}

/// Contract side of `transfer_and_call`.
pub trait TokenReceiver {
    fn receiver_address(&self) -> Address;

    /// Called after `delivery` moved into the receiver. An error undoes
    /// the transfer.
    fn on_token_received(&mut self, delivery: &Delivery, payload: &[u8]) -> SettlementResult<()>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenEvent {
    Mint {
        to: Address,
        amount: Amount,
    },
    Transfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub address: Address,
    pub total_supply: Amount,
    pub balances: BTreeMap<Address, Amount>,
    pub merkle_root: String,
}

/// Balances touched by a transfer, as they were before it.
struct Checkpoint {
    balances: Vec<(Address, Option<Amount>)>,
    events_len: usize,
}

/// In-memory LEAF token: fixed supply minted once, plain transfers, and
/// transfer-with-callback into receiver contracts.
#[derive(Clone, Debug)]
pub struct LeafToken {
    address: Address,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    events: Vec<TokenEvent>,
}

impl LeafToken {
    /// Deploy the token at `address`, minting `supply` to `owner`.
    pub fn new(address: Address, owner: Address, supply: Amount) -> Self {
        let mut balances = BTreeMap::new();
        if supply > 0 {
            balances.insert(owner, supply);
        }
        Self {
            address,
            total_supply: supply,
            balances,
            events: vec![TokenEvent::Mint {
                to: owner,
                amount: supply,
            }],
        }
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }

    /// Move `amount` from `from` into `receiver` and run its hook with
    /// `payload`. When the hook fails the transfer is rolled back.
    pub fn transfer_and_call<R>(
        &mut self,
        from: &Address,
        receiver: &mut R,
        amount: Amount,
        payload: &[u8],
    ) -> SettlementResult<()>
    where
        R: TokenReceiver + ?Sized,
    {
        let to = receiver.receiver_address();
        let checkpoint = self.checkpoint(&[*from, to]);
        self.transfer(from, &to, amount)?;
        let delivery = Delivery::new(self.address, *from, amount);
        if let Err(err) = receiver.on_token_received(&delivery, payload) {
            warn!(%from, %to, amount, error = %err, "transfer hook rejected, rolling back");
            self.restore(checkpoint);
            return Err(err);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        let tree = BalanceTree::from_balances(self.balances.iter().map(|(a, b)| (a, *b)));
        TokenSnapshot {
            address: self.address,
            total_supply: self.total_supply,
            balances: self.balances.clone(),
            merkle_root: tree.root_hex(),
        }
    }

    fn checkpoint(&self, accounts: &[Address]) -> Checkpoint {
        Checkpoint {
            balances: accounts
                .iter()
                .map(|account| (*account, self.balances.get(account).copied()))
                .collect(),
            events_len: self.events.len(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        for (account, balance) in checkpoint.balances {
            match balance {
                Some(amount) => self.balances.insert(account, amount),
                None => self.balances.remove(&account),
            };
        }
        self.events.truncate(checkpoint.events_len);
    }
}

impl TokenLedger for LeafToken {
    fn token_address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, owner: &Address) -> Amount {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> SettlementResult<()> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(SettlementError::InsufficientBalance {
                account: *from,
                have,
                need: amount,
            });
        }
        if from != to {
            let credited = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or(SettlementError::ArithmeticOverflow)?;
            self.balances.insert(*from, have - amount);
            self.balances.insert(*to, credited);
        }
        self.events.push(TokenEvent::Transfer {
            from: *from,
            to: *to,
            amount,
        });
        debug!(%from, %to, amount, "token transfer");
        Ok(())
    }
}
