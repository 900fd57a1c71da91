use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Account, AccountId, Amount, ClientId, MovementError, Operation, Statement};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("An account already exists for client {0}")]
    DuplicateClient(ClientId),

    #[error(transparent)]
    Rejected(#[from] MovementError),

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for accounts and their statement history.
///
/// Implementations must make `insert_account` an atomic
/// check-client-then-insert, and `append_movement` an atomic
/// read-validate-append for the account it touches. Reads return snapshots
/// that never include a partially appended statement.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Store a freshly opened account together with its opening statements.
    async fn insert_account(&self, account: &Account) -> StorageResult<()>;

    async fn find_by_id(&self, account_id: &str) -> StorageResult<Option<Account>>;

    async fn find_by_client_id(&self, client_id: &str) -> StorageResult<Option<Account>>;

    /// Statement history in insertion order. Empty when the account is unknown.
    async fn statements(&self, account_id: &str) -> StorageResult<Vec<Statement>>;

    /// All accounts, oldest first.
    async fn list_accounts(&self) -> StorageResult<Vec<Account>>;

    /// Apply a deposit or withdrawal and append its statement.
    ///
    /// Checks run in order: account exists, amount is positive, funds cover
    /// a withdrawal. The recorded timestamp is `at`, moved forward if needed
    /// so an account's history never goes back in time.
    async fn append_movement(
        &self,
        account_id: &str,
        operation: Operation,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> StorageResult<Statement>;
}
