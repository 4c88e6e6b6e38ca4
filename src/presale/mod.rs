use leaf_core::{Address, Amount, SettlementError, SettlementResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::token::TokenLedger;

/// Constructor wiring of a presale deployment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresaleConfig {
    pub token: Address,
    pub vesting: Address,
    /// Payments below this many wei are rejected.
    pub min_accept_amount: Amount,
    /// Token units allocated per wei paid.
    pub leaf_per_wei: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresaleEvent {
    Purchased {
        payer: Address,
        wei: Amount,
        allocation: Amount,
    },
}

/// Fixed-rate presale drawing on the tokens it holds.
///
/// Inventory is never cached: every payment reads the live token balance
/// of the presale address and transfers in the same call. Payments are
/// settled through [`SettlementEngine::buy`](crate::engine::SettlementEngine::buy),
/// which pairs the presale with its own token:
///
/// ```compile_fail
/// use leaf_settle::presale::{PresaleConfig, PresaleSettlement};
/// use leaf_settle::token::LeafToken;
/// use leaf_settle::Address;
///
/// let owner = Address::from_label("owner");
/// let mut token = LeafToken::new(Address::from_label("leaf"), owner, 1_000);
/// let mut presale = PresaleSettlement::new(
///     Address::from_label("presale"),
///     PresaleConfig {
///         token: Address::from_label("leaf"),
///         vesting: Address::from_label("vesting"),
///         min_accept_amount: 0,
///         leaf_per_wei: 1,
///     },
/// );
/// presale.receive_payment(&mut token, &owner, 10).unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct PresaleSettlement {
    address: Address,
    config: PresaleConfig,
    wei_raised: Amount,
    tokens_sold: Amount,
    events: Vec<PresaleEvent>,
}

impl PresaleSettlement {
    pub fn new(address: Address, config: PresaleConfig) -> Self {
        Self {
            address,
            config,
            wei_raised: 0,
            tokens_sold: 0,
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &PresaleConfig {
        &self.config
    }

    pub fn min_accept_amount(&self) -> Amount {
        self.config.min_accept_amount
    }

    pub fn leaf_per_wei(&self) -> Amount {
        self.config.leaf_per_wei
    }

    pub fn wei_raised(&self) -> Amount {
        self.wei_raised
    }

    pub fn tokens_sold(&self) -> Amount {
        self.tokens_sold
    }

    pub fn purchases(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[PresaleEvent] {
        &self.events
    }

    /// Tokens a payment of `wei` would be allocated, ignoring inventory.
    pub fn quote(&self, wei: Amount) -> SettlementResult<Amount> {
        if wei < self.config.min_accept_amount {
            return Err(SettlementError::BelowMinimum {
                amount: wei,
                minimum: self.config.min_accept_amount,
            });
        }
        wei.checked_mul(self.config.leaf_per_wei)
            .ok_or(SettlementError::ArithmeticOverflow)
    }

    pub fn current_token_balance<T>(&self, token: &T) -> Amount
    where
        T: TokenLedger + ?Sized,
    {
        token.balance_of(&self.address)
    }

    /// Settle a payment of `wei` from `payer`, sending the allocation to the
    /// payer. Returns the allocated token amount.
    pub(crate) fn receive_payment<T>(&mut self, token: &mut T, payer: &Address, wei: Amount) -> SettlementResult<Amount>
    where
        T: TokenLedger + ?Sized,
    {
        if token.token_address() != self.config.token {
            return Err(SettlementError::UnauthorizedToken(token.token_address()));
        }
        let allocation = self.quote(wei).map_err(|err| {
            warn!(%payer, wei, error = %err, "payment rejected");
            err
        })?;
        let available = self.current_token_balance(&*token);
        if allocation > available {
            warn!(%payer, wei, allocation, available, "presale inventory exhausted");
            return Err(SettlementError::InsufficientInventory {
                requested: allocation,
                available,
            });
        }
        let wei_raised = self
            .wei_raised
            .checked_add(wei)
            .ok_or(SettlementError::ArithmeticOverflow)?;
        let tokens_sold = self
            .tokens_sold
            .checked_add(allocation)
            .ok_or(SettlementError::ArithmeticOverflow)?;

        token.transfer(&self.address, payer, allocation)?;

        self.wei_raised = wei_raised;
        self.tokens_sold = tokens_sold;
        self.events.push(PresaleEvent::Purchased {
            payer: *payer,
            wei,
            allocation,
        });
        debug!(%payer, wei, allocation, remaining = available - allocation, "presale purchase");
        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::LeafToken;

    struct Fixture {
        token: LeafToken,
        presale: PresaleSettlement,
        owner: Address,
        payer: Address,
    }

    fn fixture(min_accept_amount: Amount, leaf_per_wei: Amount, inventory: Amount) -> Fixture {
        let owner = Address::from_label("owner");
        let token_addr = Address::from_label("leaf");
        let mut token = LeafToken::new(token_addr, owner, 10u128.pow(30));
        let presale = PresaleSettlement::new(
            Address::from_label("presale"),
            PresaleConfig {
                token: token_addr,
                vesting: Address::from_label("vesting"),
                min_accept_amount,
                leaf_per_wei,
            },
        );
        token.transfer(&owner, &presale.address(), inventory).unwrap();
        Fixture {
            token,
            presale,
            owner,
            payer: Address::from_label("payer"),
        }
    }

    #[test]
    fn payment_below_minimum_is_rejected() {
        let Fixture {
            mut token,
            mut presale,
            payer,
            ..
        } = fixture(100, 10, 1_000_000);
        let err = presale.receive_payment(&mut token, &payer, 99).unwrap_err();
        assert_eq!(
            err,
            SettlementError::BelowMinimum {
                amount: 99,
                minimum: 100
            }
        );
        assert_eq!(token.balance_of(&payer), 0);
        assert_eq!(presale.wei_raised(), 0);
    }

    #[test]
    fn accepted_payment_moves_exact_allocation() {
        let Fixture {
            mut token,
            mut presale,
            payer,
            ..
        } = fixture(100, 10, 1_000_000);
        let allocation = presale.receive_payment(&mut token, &payer, 100).unwrap();
        assert_eq!(allocation, 1_000);
        assert_eq!(token.balance_of(&payer), 1_000);
        assert_eq!(presale.current_token_balance(&token), 999_000);
        assert_eq!(presale.wei_raised(), 100);
        assert_eq!(presale.tokens_sold(), 1_000);
        assert_eq!(presale.purchases(), 1);
    }

    #[test]
    fn allocation_equal_to_inventory_is_accepted() {
        let Fixture {
            mut token,
            mut presale,
            payer,
            ..
        } = fixture(0, 10, 1_000);
        presale.receive_payment(&mut token, &payer, 100).unwrap();
        assert_eq!(presale.current_token_balance(&token), 0);
    }

    #[test]
    fn insufficient_inventory_changes_nothing() {
        let Fixture {
            mut token,
            mut presale,
            payer,
            owner,
        } = fixture(0, 10, 999);
        let before = token.snapshot();
        let err = presale.receive_payment(&mut token, &payer, 100).unwrap_err();
        assert_eq!(
            err,
            SettlementError::InsufficientInventory {
                requested: 1_000,
                available: 999
            }
        );
        assert_eq!(token.snapshot(), before);
        assert_eq!(token.balance_of(&owner), 10u128.pow(30) - 999);
        assert!(presale.events().is_empty());
    }

    #[test]
    fn overflowing_allocation_is_rejected() {
        let Fixture {
            mut token,
            mut presale,
            payer,
            ..
        } = fixture(0, Amount::MAX / 2 + 1, 1_000);
        let err = presale.receive_payment(&mut token, &payer, 2).unwrap_err();
        assert_eq!(err, SettlementError::ArithmeticOverflow);
        assert_eq!(token.balance_of(&payer), 0);
    }

    #[test]
    fn tiny_payment_at_high_rate() {
        // 100 wei (0.0000000000000001 ether) at 1e10 tokens per wei.
        let Fixture {
            mut token,
            mut presale,
            payer,
            ..
        } = fixture(0, 10_000_000_000, 1_000_000_000_000);
        let allocation = presale.receive_payment(&mut token, &payer, 100).unwrap();
        assert_eq!(allocation, 1_000_000_000_000);
        assert_eq!(token.balance_of(&payer), allocation);
        assert_eq!(presale.current_token_balance(&token), 0);
    }

    #[test]
    fn quote_applies_floor_but_not_inventory() {
        let Fixture { presale, .. } = fixture(5, 3, 0);
        assert_eq!(presale.quote(5), Ok(15));
        assert!(presale.quote(4).is_err());
    }
}
