use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    AccountId, Amount, ClientId, MovementError, Operation, PageRequestError, date_format,
};
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account id cannot be empty")]
    InvalidAccountId,

    #[error("Client id cannot be empty")]
    InvalidClientId,

    #[error("Account with client id {0} already exists")]
    AccountAlreadyExists(ClientId),

    #[error("The amount to {operation} must be positive, got {amount}")]
    InvalidAmount { operation: Operation, amount: Amount },

    #[error("Initial amount cannot be negative, got {0}")]
    NegativeInitialAmount(Amount),

    #[error("Balance of account {account_id} cannot hold another {amount}")]
    BalanceOverflow { account_id: AccountId, amount: Amount },

    #[error("Account with id {0} does not exist")]
    AccountNotFound(AccountId),

    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Amount,
        requested: Amount,
    },

    #[error("Start date {} must be before end date {}", date_format::format(.start), date_format::format(.end))]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid page number: {0}")]
    InvalidPage(i64),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(i64),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Coarse classification of ledger failures, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unacceptable caller input
    InvalidData,
    /// The referenced account does not exist (a kind of invalid data)
    MissingAccount,
    /// Business-rule rejection of a withdrawal
    InsufficientFunds,
    /// Anything the caller could not have caused
    Internal,
}

impl ErrorKind {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ErrorKind::Internal)
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound(_) => ErrorKind::MissingAccount,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Storage(_) => ErrorKind::Internal,
            _ => ErrorKind::InvalidData,
        }
    }

    /// Attach the account to a rejection coming from the account itself.
    pub fn from_movement(account_id: &str, err: MovementError) -> Self {
        match err {
            MovementError::NonPositiveAmount { operation, amount } => {
                LedgerError::InvalidAmount { operation, amount }
            }
            MovementError::InsufficientFunds { balance, requested } => {
                LedgerError::InsufficientFunds {
                    account_id: account_id.to_string(),
                    balance,
                    requested,
                }
            }
            MovementError::BalanceOverflow { amount, .. } => LedgerError::BalanceOverflow {
                account_id: account_id.to_string(),
                amount,
            },
        }
    }

    pub fn from_storage(account_id: &str, err: StorageError) -> Self {
        match err {
            StorageError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            StorageError::DuplicateClient(client_id) => LedgerError::AccountAlreadyExists(client_id),
            StorageError::Rejected(rejection) => Self::from_movement(account_id, rejection),
            StorageError::Backend(err) => LedgerError::Storage(err),
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        Self::from_storage("", err)
    }
}

impl From<PageRequestError> for LedgerError {
    fn from(err: PageRequestError) -> Self {
        match err {
            PageRequestError::InvalidPage(page) => LedgerError::InvalidPage(page),
            PageRequestError::InvalidPageSize(size) => LedgerError::InvalidPageSize(size),
        }
    }
}

/// Error body handed to whatever sits in front of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: u16,
    pub status: String,
    pub message: String,
    #[serde(with = "date_format")]
    pub time: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(err: &LedgerError, time: DateTime<Utc>) -> Self {
        let (code, status) = if err.kind().is_client_error() {
            (400, "BAD_REQUEST")
        } else {
            (500, "INTERNAL_SERVER_ERROR")
        };

        Self {
            code,
            status: status.to_string(),
            message: err.to_string(),
            time,
        }
    }

    /// Report for a failure that did not come from the ledger at all.
    pub fn internal(message: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            code: 500,
            status: "INTERNAL_SERVER_ERROR".to_string(),
            message: message.into(),
            time,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }
}
