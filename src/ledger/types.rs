//! Request and result types of ledger units of work

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::models::{Account, AddAccountBalanceParams, CreateAccountParams, Entry, Transfer};

/// Move `amount` from `from_account_id` to `to_account_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

impl TransferTxParams {
    pub fn new(from_account_id: i64, to_account_id: i64, amount: i64) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount <= 0 {
            return Err(ValidationError::InvalidAmount(self.amount));
        }
        for id in [self.from_account_id, self.to_account_id] {
            if id <= 0 {
                return Err(ValidationError::InvalidAccountId(id));
            }
        }
        if self.from_account_id == self.to_account_id {
            return Err(ValidationError::SameAccount(self.from_account_id));
        }
        Ok(())
    }

    /// Debit and credit balance updates, smaller account id first.
    ///
    /// Every transfer touching the same pair of rows locks them in the same
    /// global order, whichever way the money moves.
    pub fn balance_updates(&self) -> [AddAccountBalanceParams; 2] {
        let debit = AddAccountBalanceParams {
            id: self.from_account_id,
            amount: -self.amount,
        };
        let credit = AddAccountBalanceParams {
            id: self.to_account_id,
            amount: self.amount,
        };

        if debit.id < credit.id {
            [debit, credit]
        } else {
            [credit, debit]
        }
    }
}

/// Everything a committed transfer wrote, in the caller's from/to roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// Open an account; a non-zero opening balance is booked as an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccountParams {
    pub owner: String,
    pub currency: String,
    pub opening_balance: i64,
}

impl OpenAccountParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.opening_balance < 0 {
            return Err(ValidationError::NegativeOpeningBalance(
                self.opening_balance,
            ));
        }
        if self.owner.trim().is_empty() {
            return Err(ValidationError::MissingField("owner"));
        }
        if self.currency.trim().is_empty() {
            return Err(ValidationError::MissingField("currency"));
        }
        Ok(())
    }

    /// Row insert with a zero balance; the opening amount is added afterwards
    pub(crate) fn create_params(&self) -> CreateAccountParams {
        CreateAccountParams {
            owner: self.owner.clone(),
            balance: 0,
            currency: self.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccountResult {
    pub account: Account,
    pub opening_entry: Option<Entry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_non_positive_amount() {
        assert_eq!(
            TransferTxParams::new(1, 2, 0).validate(),
            Err(ValidationError::InvalidAmount(0))
        );
        assert_eq!(
            TransferTxParams::new(1, 2, -5).validate(),
            Err(ValidationError::InvalidAmount(-5))
        );
    }

    #[test]
    fn test_validate_rejects_same_account() {
        assert_eq!(
            TransferTxParams::new(4, 4, 10).validate(),
            Err(ValidationError::SameAccount(4))
        );
    }

    #[test]
    fn test_validate_rejects_non_positive_id() {
        assert_eq!(
            TransferTxParams::new(0, 2, 10).validate(),
            Err(ValidationError::InvalidAccountId(0))
        );
        assert_eq!(
            TransferTxParams::new(1, -2, 10).validate(),
            Err(ValidationError::InvalidAccountId(-2))
        );
        assert!(TransferTxParams::new(1, 2, 10).validate().is_ok());
    }

    #[test]
    fn test_balance_updates_ascending_either_direction() {
        let forward = TransferTxParams::new(3, 5, 10).balance_updates();
        assert_eq!(
            forward,
            [
                AddAccountBalanceParams { id: 3, amount: -10 },
                AddAccountBalanceParams { id: 5, amount: 10 },
            ]
        );

        let reverse = TransferTxParams::new(5, 3, 10).balance_updates();
        assert_eq!(
            reverse,
            [
                AddAccountBalanceParams { id: 3, amount: 10 },
                AddAccountBalanceParams { id: 5, amount: -10 },
            ]
        );
    }

    #[test]
    fn test_balance_updates_net_to_zero() {
        let [a, b] = TransferTxParams::new(9, 2, 77).balance_updates();
        assert_eq!(a.amount + b.amount, 0);
    }

    #[test]
    fn test_open_account_validation() {
        let mut params = OpenAccountParams {
            owner: "alice".into(),
            currency: "USD".into(),
            opening_balance: 100,
        };
        assert!(params.validate().is_ok());

        params.opening_balance = -1;
        assert_eq!(
            params.validate(),
            Err(ValidationError::NegativeOpeningBalance(-1))
        );

        params.opening_balance = 0;
        params.owner = "  ".into();
        assert_eq!(params.validate(), Err(ValidationError::MissingField("owner")));
    }
}
