use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Amount, Operation, Statement};

pub type AccountId = String;
pub type ClientId = String;

/// Why a deposit or withdrawal was refused by the account itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MovementError {
    #[error("The amount to {operation} must be positive, got {amount}")]
    NonPositiveAmount { operation: Operation, amount: Amount },

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Amount, requested: Amount },

    #[error("Balance overflow: {balance} + {amount}")]
    BalanceOverflow { balance: Amount, amount: Amount },
}

/// Check that an amount is acceptable for the given operation.
pub fn validate_amount(operation: Operation, amount: Amount) -> Result<(), MovementError> {
    if amount <= 0 {
        return Err(MovementError::NonPositiveAmount { operation, amount });
    }
    Ok(())
}

/// Compute the balance after applying `operation` for `amount`.
/// Withdrawals may never take the balance below zero.
pub fn next_balance(
    balance: Amount,
    operation: Operation,
    amount: Amount,
) -> Result<Amount, MovementError> {
    validate_amount(operation, amount)?;

    if operation == Operation::Withdraw && amount > balance {
        return Err(MovementError::InsufficientFunds {
            balance,
            requested: amount,
        });
    }

    operation
        .apply_to(balance, amount)
        .ok_or(MovementError::BalanceOverflow { balance, amount })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub client_id: ClientId,
    pub current_balance: Amount,
    /// Chronological history, oldest first. Append-only.
    pub account_statements: Vec<Statement>,
}

impl Account {
    /// Open an account with a fresh id. The opening balance is recorded as
    /// a deposit so the history always explains the balance.
    pub fn open(client_id: impl Into<ClientId>, initial_amount: Amount, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            current_balance: initial_amount,
            account_statements: vec![Statement::new(
                Operation::Deposit,
                initial_amount,
                initial_amount,
                at,
            )],
        }
    }

    pub fn last_statement(&self) -> Option<&Statement> {
        self.account_statements.last()
    }

    /// Timestamp for a new statement: never earlier than the latest one.
    pub fn next_operation_date(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_statement() {
            Some(last) if last.operation_date > at => last.operation_date,
            _ => at,
        }
    }

    /// Apply a deposit or withdrawal, appending its statement.
    /// On error the account is left untouched.
    pub fn apply(
        &mut self,
        operation: Operation,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<Statement, MovementError> {
        let balance = next_balance(self.current_balance, operation, amount)?;
        let statement = Statement::new(operation, amount, balance, self.next_operation_date(at));

        self.current_balance = balance;
        self.account_statements.push(statement.clone());
        Ok(statement)
    }

    pub fn deposit(&mut self, amount: Amount, at: DateTime<Utc>) -> Result<Statement, MovementError> {
        self.apply(Operation::Deposit, amount, at)
    }

    pub fn withdraw(&mut self, amount: Amount, at: DateTime<Utc>) -> Result<Statement, MovementError> {
        self.apply(Operation::Withdraw, amount, at)
    }

    /// True when the balance matches the last statement and every step of the
    /// history is consistent with the one before it.
    pub fn is_consistent(&self) -> bool {
        let Some(first) = self.account_statements.first() else {
            return self.current_balance >= 0;
        };
        if first.operation != Operation::Deposit || first.account_balance != first.amount {
            return false;
        }

        let history_ok = self.account_statements.windows(2).all(|pair| {
            let (prev, next) = (&pair[0], &pair[1]);
            next.operation_date >= prev.operation_date
                && next.account_balance >= 0
                && next.operation.apply_to(prev.account_balance, next.amount)
                    == Some(next.account_balance)
        });

        history_ok
            && self
                .last_statement()
                .is_some_and(|last| last.account_balance == self.current_balance)
    }
}
