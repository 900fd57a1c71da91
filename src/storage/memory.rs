use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{Account, AccountId, Amount, ClientId, Operation, Statement};

use super::{AccountRepository, StorageError, StorageResult};

type AccountCell = Arc<RwLock<Account>>;

#[derive(Default)]
struct Index {
    accounts: HashMap<AccountId, AccountCell>,
    by_client: HashMap<ClientId, AccountId>,
    /// Account ids in creation order
    order: Vec<AccountId>,
}

/// Repository keeping everything in process memory.
///
/// The index lock is only held for lookups and inserts; each account sits
/// behind its own lock, so movements on different accounts run in parallel
/// while movements on the same account are serialized.
#[derive(Default)]
pub struct InMemoryRepository {
    index: RwLock<Index>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, account_id: &str) -> Option<AccountCell> {
        self.index.read().await.accounts.get(account_id).cloned()
    }

    async fn snapshot(cell: &AccountCell) -> Account {
        cell.read().await.clone()
    }
}

#[async_trait]
impl AccountRepository for InMemoryRepository {
    async fn insert_account(&self, account: &Account) -> StorageResult<()> {
        let mut index = self.index.write().await;

        if index.by_client.contains_key(&account.client_id) {
            return Err(StorageError::DuplicateClient(account.client_id.clone()));
        }
        if index.accounts.contains_key(&account.id) {
            return Err(anyhow::anyhow!("Account id collision: {}", account.id).into());
        }

        index
            .by_client
            .insert(account.client_id.clone(), account.id.clone());
        index.order.push(account.id.clone());
        index
            .accounts
            .insert(account.id.clone(), Arc::new(RwLock::new(account.clone())));
        Ok(())
    }

    async fn find_by_id(&self, account_id: &str) -> StorageResult<Option<Account>> {
        match self.cell(account_id).await {
            Some(cell) => Ok(Some(Self::snapshot(&cell).await)),
            None => Ok(None),
        }
    }

    async fn find_by_client_id(&self, client_id: &str) -> StorageResult<Option<Account>> {
        let cell = {
            let index = self.index.read().await;
            index
                .by_client
                .get(client_id)
                .and_then(|id| index.accounts.get(id))
                .cloned()
        };

        match cell {
            Some(cell) => Ok(Some(Self::snapshot(&cell).await)),
            None => Ok(None),
        }
    }

    async fn statements(&self, account_id: &str) -> StorageResult<Vec<Statement>> {
        match self.cell(account_id).await {
            Some(cell) => Ok(cell.read().await.account_statements.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn list_accounts(&self) -> StorageResult<Vec<Account>> {
        let cells: Vec<AccountCell> = {
            let index = self.index.read().await;
            index
                .order
                .iter()
                .filter_map(|id| index.accounts.get(id).cloned())
                .collect()
        };

        let mut accounts = Vec::with_capacity(cells.len());
        for cell in &cells {
            accounts.push(Self::snapshot(cell).await);
        }
        Ok(accounts)
    }

    async fn append_movement(
        &self,
        account_id: &str,
        operation: Operation,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> StorageResult<Statement> {
        let cell = self
            .cell(account_id)
            .await
            .ok_or_else(|| StorageError::AccountNotFound(account_id.to_string()))?;

        let mut account = cell.write().await;
        Ok(account.apply(operation, amount, at)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MovementError;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let repo = InMemoryRepository::new();
        let account = Account::open("client-a", 10, Utc::now());
        repo.insert_account(&account).await.unwrap();

        let by_id = repo.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(by_id, account);

        let by_client = repo.find_by_client_id("client-a").await.unwrap().unwrap();
        assert_eq!(by_client.id, account.id);

        assert!(repo.find_by_id("nope").await.unwrap().is_none());
        assert!(repo.find_by_client_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_client_rejected() {
        let repo = InMemoryRepository::new();
        let first = Account::open("client-a", 10, Utc::now());
        repo.insert_account(&first).await.unwrap();

        let second = Account::open("client-a", 99, Utc::now());
        let result = repo.insert_account(&second).await;
        assert!(matches!(result, Err(StorageError::DuplicateClient(ref c)) if c == "client-a"));

        assert_eq!(repo.list_accounts().await.unwrap().len(), 1);
        assert!(repo.find_by_id(&second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_movement() {
        let repo = InMemoryRepository::new();
        let account = Account::open("client-a", 10, Utc::now());
        repo.insert_account(&account).await.unwrap();

        let statement = repo
            .append_movement(&account.id, Operation::Deposit, 5, Utc::now())
            .await
            .unwrap();
        assert_eq!(statement.account_balance, 15);

        let rejected = repo
            .append_movement(&account.id, Operation::Withdraw, 16, Utc::now())
            .await;
        assert!(matches!(
            rejected,
            Err(StorageError::Rejected(MovementError::InsufficientFunds { .. }))
        ));

        assert_eq!(repo.statements(&account.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_to_missing_account() {
        let repo = InMemoryRepository::new();
        let result = repo
            .append_movement("ghost", Operation::Deposit, 0, Utc::now())
            .await;
        assert!(matches!(result, Err(StorageError::AccountNotFound(ref id)) if id == "ghost"));
        assert!(repo.statements("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_accounts_in_creation_order() {
        let repo = InMemoryRepository::new();
        for client in ["c", "a", "b"] {
            repo.insert_account(&Account::open(client, 0, Utc::now()))
                .await
                .unwrap();
        }

        let clients: Vec<String> = repo
            .list_accounts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.client_id)
            .collect();
        assert_eq!(clients, vec!["c", "a", "b"]);
    }
}
