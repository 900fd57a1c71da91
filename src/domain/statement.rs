use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::date_format;

/// Monetary amounts are unit-less integers. Balances never go below zero.
pub type Amount = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Money coming into the account (including the opening balance)
    Deposit,
    /// Money leaving the account
    Withdraw,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deposit => "DEPOSIT",
            Operation::Withdraw => "WITHDRAW",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEPOSIT" => Some(Operation::Deposit),
            "WITHDRAW" => Some(Operation::Withdraw),
            _ => None,
        }
    }

    /// Apply this operation to a balance. Returns None on overflow.
    pub fn apply_to(&self, balance: Amount, amount: Amount) -> Option<Amount> {
        match self {
            Operation::Deposit => balance.checked_add(amount),
            Operation::Withdraw => balance.checked_sub(amount),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single line of an account's history.
/// Statements are immutable once recorded; the account balance after the
/// most recent statement is always the account's current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    /// Magnitude of the operation
    pub amount: Amount,
    /// Account balance right after the operation
    pub account_balance: Amount,
    pub operation: Operation,
    #[serde(with = "date_format")]
    pub operation_date: DateTime<Utc>,
}

impl Statement {
    pub fn new(
        operation: Operation,
        amount: Amount,
        account_balance: Amount,
        operation_date: DateTime<Utc>,
    ) -> Self {
        Self {
            amount,
            account_balance,
            operation,
            operation_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_roundtrip() {
        for op in [Operation::Deposit, Operation::Withdraw] {
            assert_eq!(Operation::from_str(op.as_str()), Some(op));
        }
        assert_eq!(Operation::from_str("withdraw"), Some(Operation::Withdraw));
        assert_eq!(Operation::from_str("transfer"), None);
    }

    #[test]
    fn test_operation_apply_to() {
        assert_eq!(Operation::Deposit.apply_to(100, 50), Some(150));
        assert_eq!(Operation::Withdraw.apply_to(100, 50), Some(50));
        assert_eq!(Operation::Deposit.apply_to(Amount::MAX, 1), None);
    }

    #[test]
    fn test_statement_json_shape() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
            .and_utc();
        let statement = Statement::new(Operation::Withdraw, 50, 150, date);

        let json = serde_json::to_value(&statement).unwrap();
        assert_eq!(json["amount"], 50);
        assert_eq!(json["accountBalance"], 150);
        assert_eq!(json["operation"], "WITHDRAW");
        assert_eq!(json["operationDate"], "09/03/2024 14:05:07");
    }
}
