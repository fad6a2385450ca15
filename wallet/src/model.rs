//! Wallet balances and the currencies they hold.

use crate::error::WalletError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three balances a cash-shop wallet holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    /// NX credit
    Credit,
    /// Maple points
    Points,
    /// NX prepaid
    Prepaid,
}

impl Currency {
    /// Wire code: credit=1, points=2, prepaid=3.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Credit => 1,
            Self::Points => 2,
            Self::Prepaid => 3,
        }
    }
}

impl TryFrom<u32> for Currency {
    type Error = WalletError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Credit),
            2 => Ok(Self::Points),
            3 => Ok(Self::Prepaid),
            other => Err(WalletError::InvalidCurrency(other)),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Credit => "credit",
            Self::Points => "points",
            Self::Prepaid => "prepaid",
        })
    }
}

/// One account's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Owning account
    pub account_id: u32,
    /// NX credit balance
    pub credit: u32,
    /// Maple points balance
    pub points: u32,
    /// NX prepaid balance
    pub prepaid: u32,
}

impl Wallet {
    /// Wallet with the given balances.
    #[must_use]
    pub const fn new(account_id: u32, credit: u32, points: u32, prepaid: u32) -> Self {
        Self {
            account_id,
            credit,
            points,
            prepaid,
        }
    }

    /// Wallet with every balance at zero.
    #[must_use]
    pub const fn empty(account_id: u32) -> Self {
        Self::new(account_id, 0, 0, 0)
    }

    /// Balance held in `currency`.
    #[must_use]
    pub const fn balance(&self, currency: Currency) -> u32 {
        match currency {
            Currency::Credit => self.credit,
            Currency::Points => self.points,
            Currency::Prepaid => self.prepaid,
        }
    }

    /// Copy of this wallet with `amount` added to `currency`.
    ///
    /// # Errors
    ///
    /// [`WalletError::InsufficientBalance`] if a deduction exceeds the
    /// balance, [`WalletError::BalanceOverflow`] if a credit would exceed
    /// `u32::MAX`.
    pub fn adjusted(self, currency: Currency, amount: i32) -> Result<Self, WalletError> {
        let current = self.balance(currency);
        if amount < 0 && amount.unsigned_abs() > current {
            return Err(WalletError::InsufficientBalance(currency));
        }
        let next = current
            .checked_add_signed(amount)
            .ok_or(WalletError::BalanceOverflow(currency))?;

        let mut wallet = self;
        match currency {
            Currency::Credit => wallet.credit = next,
            Currency::Points => wallet.points = next,
            Currency::Prepaid => wallet.prepaid = next,
        }
        Ok(wallet)
    }
}
