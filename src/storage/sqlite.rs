use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::domain::{Account, Amount, Operation, Statement, next_balance, validate_amount};

use super::{AccountRepository, MIGRATION_001_INITIAL, StorageError, StorageResult};

/// Durable repository backed by a SQLite database.
///
/// Movements run inside a transaction whose first statement is the balance
/// update, so the write lock is taken up front and concurrent movements
/// queue on it instead of racing.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL, e.g. `sqlite:coffer.db`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn balance_in(
        tx: &mut Transaction<'_, Sqlite>,
        account_id: &str,
    ) -> Result<Option<Amount>> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to fetch balance")?;
        Ok(row.map(|r| r.get("balance")))
    }

    async fn account_in(
        tx: &mut Transaction<'_, Sqlite>,
        column: &str,
        value: &str,
    ) -> Result<Option<Account>> {
        let query = format!(
            "SELECT id, client_id, balance FROM accounts WHERE {} = ?",
            column
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to fetch account")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.get("id");
        let statements = Self::statements_in(tx, &id).await?;
        Ok(Some(Account {
            id,
            client_id: row.get("client_id"),
            current_balance: row.get("balance"),
            account_statements: statements,
        }))
    }

    async fn statements_in(
        tx: &mut Transaction<'_, Sqlite>,
        account_id: &str,
    ) -> Result<Vec<Statement>> {
        let rows = sqlx::query(
            r#"
            SELECT amount, account_balance, operation, operation_date
            FROM statements
            WHERE account_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(account_id)
        .fetch_all(&mut **tx)
        .await
        .context("Failed to list statements")?;

        rows.iter().map(Self::row_to_statement).collect()
    }

    async fn insert_statement(
        tx: &mut Transaction<'_, Sqlite>,
        account_id: &str,
        sequence: i64,
        statement: &Statement,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO statements (account_id, sequence, amount, account_balance, operation, operation_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account_id)
        .bind(sequence)
        .bind(statement.amount)
        .bind(statement.account_balance)
        .bind(statement.operation.as_str())
        .bind(encode_date(&statement.operation_date))
        .execute(&mut **tx)
        .await
        .context("Failed to save statement")?;
        Ok(())
    }

    fn row_to_statement(row: &SqliteRow) -> Result<Statement> {
        let operation_str: String = row.get("operation");
        let date_str: String = row.get("operation_date");

        Ok(Statement {
            amount: row.get("amount"),
            account_balance: row.get("account_balance"),
            operation: Operation::from_str(&operation_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid operation: {}", operation_str))?,
            operation_date: decode_date(&date_str)?,
        })
    }
}

/// Fixed-width RFC 3339 so that text order matches time order.
fn encode_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_date(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("Invalid operation_date timestamp")?
        .with_timezone(&Utc))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl AccountRepository for SqliteRepository {
    async fn insert_account(&self, account: &Account) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let created_at = account
            .account_statements
            .first()
            .map(|s| s.operation_date)
            .unwrap_or_else(Utc::now);

        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (id, client_id, balance, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.client_id)
        .bind(account.current_balance)
        .bind(encode_date(&created_at))
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                let taken: Option<String> =
                    sqlx::query_scalar::<Sqlite, String>("SELECT client_id FROM accounts WHERE client_id = ?")
                        .bind(&account.client_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .context("Failed to check client id")?;
                if taken.is_some() {
                    return Err(StorageError::DuplicateClient(account.client_id.clone()));
                }
            }
            return Err(anyhow::Error::new(err).context("Failed to save account").into());
        }

        for (sequence, statement) in account.account_statements.iter().enumerate() {
            let stored = Statement {
                operation_date: statement.operation_date.trunc_subsecs(6),
                ..statement.clone()
            };
            Self::insert_statement(&mut tx, &account.id, sequence as i64 + 1, &stored).await?;
        }

        tx.commit().await.context("Failed to commit account")?;
        Ok(())
    }

    async fn find_by_id(&self, account_id: &str) -> StorageResult<Option<Account>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let account = Self::account_in(&mut tx, "id", account_id).await?;
        tx.commit().await.context("Failed to end read transaction")?;
        Ok(account)
    }

    async fn find_by_client_id(&self, client_id: &str) -> StorageResult<Option<Account>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let account = Self::account_in(&mut tx, "client_id", client_id).await?;
        tx.commit().await.context("Failed to end read transaction")?;
        Ok(account)
    }

    async fn statements(&self, account_id: &str) -> StorageResult<Vec<Statement>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let statements = Self::statements_in(&mut tx, account_id).await?;
        tx.commit().await.context("Failed to end read transaction")?;
        Ok(statements)
    }

    async fn list_accounts(&self) -> StorageResult<Vec<Account>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let rows = sqlx::query(
            "SELECT id, client_id, balance FROM accounts ORDER BY created_at, rowid",
        )
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list accounts")?;

        let statement_rows = sqlx::query(
            r#"
            SELECT account_id, amount, account_balance, operation, operation_date
            FROM statements
            ORDER BY account_id, sequence
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list statements")?;

        tx.commit().await.context("Failed to end read transaction")?;

        let mut statements: HashMap<String, Vec<Statement>> = HashMap::new();
        for row in &statement_rows {
            let account_id: String = row.get("account_id");
            statements
                .entry(account_id)
                .or_default()
                .push(Self::row_to_statement(row)?);
        }

        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                Account {
                    account_statements: statements.remove(&id).unwrap_or_default(),
                    client_id: row.get("client_id"),
                    current_balance: row.get("balance"),
                    id,
                }
            })
            .collect())
    }

    async fn append_movement(
        &self,
        account_id: &str,
        operation: Operation,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> StorageResult<Statement> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        if let Err(rejection) = validate_amount(operation, amount) {
            return match Self::balance_in(&mut tx, account_id).await? {
                Some(_) => Err(rejection.into()),
                None => Err(StorageError::AccountNotFound(account_id.to_string())),
            };
        }

        // The guarded update both checks and applies the new balance
        let updated: Option<Amount> = match operation {
            Operation::Deposit => {
                sqlx::query_scalar::<Sqlite, Amount>(
                    r#"
                    UPDATE accounts SET balance = balance + ?
                    WHERE id = ? AND balance <= ?
                    RETURNING balance
                    "#,
                )
                .bind(amount)
                .bind(account_id)
                .bind(Amount::MAX - amount)
                .fetch_optional(&mut *tx)
                .await
            }
            Operation::Withdraw => {
                sqlx::query_scalar::<Sqlite, Amount>(
                    r#"
                    UPDATE accounts SET balance = balance - ?
                    WHERE id = ? AND balance >= ?
                    RETURNING balance
                    "#,
                )
                .bind(amount)
                .bind(account_id)
                .bind(amount)
                .fetch_optional(&mut *tx)
                .await
            }
        }
        .context("Failed to update balance")?;

        let Some(balance) = updated else {
            let current = Self::balance_in(&mut tx, account_id)
                .await?
                .ok_or_else(|| StorageError::AccountNotFound(account_id.to_string()))?;
            return Err(match next_balance(current, operation, amount) {
                Err(rejection) => rejection.into(),
                Ok(_) => anyhow::anyhow!("Balance update for {} was not applied", account_id).into(),
            });
        };

        let last = sqlx::query(
            r#"
            SELECT sequence, operation_date
            FROM statements
            WHERE account_id = ?
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch last statement")?;

        let at = at.trunc_subsecs(6);
        let (sequence, operation_date) = match last {
            Some(row) => {
                let last_date = decode_date(&row.get::<String, _>("operation_date"))?;
                (row.get::<i64, _>("sequence") + 1, at.max(last_date))
            }
            None => (1, at),
        };

        let statement = Statement::new(operation, amount, balance, operation_date);
        Self::insert_statement(&mut tx, account_id, sequence, &statement).await?;

        tx.commit().await.context("Failed to commit movement")?;
        Ok(statement)
    }
}
