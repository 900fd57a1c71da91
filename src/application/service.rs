use std::sync::Arc;

use anyhow::Result as AnyResult;
use tracing::{debug, info, warn};

use crate::domain::{
    Account, Amount, Clock, DateRange, Operation, Page, PageRequest, Statement, SystemClock,
};
use crate::storage::{AccountRepository, InMemoryRepository, SqliteRepository};

use super::LedgerError;

/// Application service providing the ledger operations.
/// This is the primary interface for any client (CLI, API, etc.).
///
/// Cloning is cheap and clones share the same accounts, so one service can
/// be handed to every request handler.
#[derive(Clone)]
pub struct LedgerService {
    repo: Arc<dyn AccountRepository>,
    clock: Arc<dyn Clock>,
}

impl LedgerService {
    /// Create a new ledger service on top of the given repository.
    pub fn new(repo: Arc<dyn AccountRepository>) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock),
        }
    }

    /// A ledger that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRepository::new()))
    }

    /// Initialize a SQLite database at the given path, creating it if needed.
    pub async fn init(database_path: &str) -> AnyResult<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = SqliteRepository::init(&db_url).await?;
        Ok(Self::new(Arc::new(repo)))
    }

    /// Connect to an existing SQLite database.
    pub async fn connect(database_path: &str) -> AnyResult<Self> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = SqliteRepository::connect(&db_url).await?;
        Ok(Self::new(Arc::new(repo)))
    }

    /// Replace the source of operation timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account for a client, recording the initial amount as a deposit.
    pub async fn create_account(
        &self,
        client_id: &str,
        initial_amount: Amount,
    ) -> Result<Account, LedgerError> {
        if client_id.is_empty() {
            warn!("rejected account creation with empty client id");
            return Err(LedgerError::InvalidClientId);
        }
        if initial_amount < 0 {
            warn!(client_id, initial_amount, "rejected negative initial amount");
            return Err(LedgerError::NegativeInitialAmount(initial_amount));
        }

        let account = Account::open(client_id, initial_amount, self.clock.now());

        // The repository checks the client id and inserts in one step
        if let Err(err) = self.repo.insert_account(&account).await {
            let err = LedgerError::from_storage(&account.id, err);
            warn!(client_id, error = %err, "account creation failed");
            return Err(err);
        }

        info!(
            account_id = %account.id,
            client_id,
            initial_amount,
            "account created"
        );
        Ok(account)
    }

    /// Look up an account. Absence is not an error.
    pub async fn find_account_by_id(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        validate_account_id(account_id)?;
        Ok(self.repo.find_by_id(account_id).await?)
    }

    pub async fn find_account_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Account>, LedgerError> {
        if client_id.is_empty() {
            return Err(LedgerError::InvalidClientId);
        }
        Ok(self.repo.find_by_client_id(client_id).await?)
    }

    /// Full history of an account; empty when the account does not exist.
    pub async fn find_statements_by_account_id(
        &self,
        account_id: &str,
    ) -> Result<Vec<Statement>, LedgerError> {
        validate_account_id(account_id)?;
        Ok(self.repo.statements(account_id).await?)
    }

    /// List every account, oldest first.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.repo.list_accounts().await?)
    }

    /// Current balance of an account.
    pub async fn get_balance(&self, account_id: &str) -> Result<Amount, LedgerError> {
        Ok(self.require_account(account_id).await?.current_balance)
    }

    // ========================
    // Movements
    // ========================

    /// Add money to an account.
    pub async fn deposit(&self, amount: Amount, account_id: &str) -> Result<Statement, LedgerError> {
        self.apply(Operation::Deposit, amount, account_id).await
    }

    /// Take money out of an account. The balance never goes below zero.
    pub async fn withdraw(&self, amount: Amount, account_id: &str) -> Result<Statement, LedgerError> {
        self.apply(Operation::Withdraw, amount, account_id).await
    }

    async fn apply(
        &self,
        operation: Operation,
        amount: Amount,
        account_id: &str,
    ) -> Result<Statement, LedgerError> {
        validate_account_id(account_id)?;

        let at = self.clock.now();
        match self
            .repo
            .append_movement(account_id, operation, amount, at)
            .await
        {
            Ok(statement) => {
                info!(
                    account_id,
                    %operation,
                    amount,
                    balance = statement.account_balance,
                    "movement recorded"
                );
                Ok(statement)
            }
            Err(err) => {
                let err = LedgerError::from_storage(account_id, err);
                warn!(account_id, %operation, amount, error = %err, "movement rejected");
                Err(err)
            }
        }
    }

    // ========================
    // Statement queries
    // ========================

    /// Statements of an account within an optional, inclusive date range,
    /// in the order they were recorded.
    pub async fn get_statements(
        &self,
        account_id: &str,
        range: DateRange,
    ) -> Result<Vec<Statement>, LedgerError> {
        self.statements_within(account_id, range).await
    }

    /// One page of `get_statements`. Pages past the end come back empty.
    pub async fn get_statements_page(
        &self,
        account_id: &str,
        range: DateRange,
        page: i64,
        size: i64,
    ) -> Result<Page<Statement>, LedgerError> {
        let matching = self.statements_within(account_id, range).await?;
        let request = PageRequest::new(page, size).inspect_err(|err| {
            warn!(account_id, error = %err, "rejected page request");
        })?;

        Ok(Page::slice(matching, request))
    }

    /// Filter an account's history by date and optionally cut one page out
    /// of it. Without a page request the whole result is a single page.
    pub async fn query_statements(
        &self,
        account_id: &str,
        range: DateRange,
        page: Option<PageRequest>,
    ) -> Result<Page<Statement>, LedgerError> {
        let matching = self.statements_within(account_id, range).await?;

        Ok(match page {
            Some(request) => Page::slice(matching, request),
            None => Page::single(matching),
        })
    }

    async fn statements_within(
        &self,
        account_id: &str,
        range: DateRange,
    ) -> Result<Vec<Statement>, LedgerError> {
        let account = self.require_account(account_id).await?;
        check_range(&range)?;

        let matching = range.filter(account.account_statements);
        debug!(account_id, matching = matching.len(), "statements selected");
        Ok(matching)
    }

    async fn require_account(&self, account_id: &str) -> Result<Account, LedgerError> {
        match self.find_account_by_id(account_id).await? {
            Some(account) => Ok(account),
            None => {
                warn!(account_id, "account does not exist");
                Err(LedgerError::AccountNotFound(account_id.to_string()))
            }
        }
    }
}

fn validate_account_id(account_id: &str) -> Result<(), LedgerError> {
    if account_id.is_empty() {
        warn!("rejected empty account id");
        return Err(LedgerError::InvalidAccountId);
    }
    Ok(())
}

fn check_range(range: &DateRange) -> Result<(), LedgerError> {
    match (range.start, range.end) {
        (Some(start), Some(end)) if !range.is_valid() => {
            warn!(%start, %end, "rejected inverted date range");
            Err(LedgerError::InvalidDateRange { start, end })
        }
        _ => Ok(()),
    }
}
