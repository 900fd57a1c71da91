use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use crate::application::{ErrorReport, LedgerError, LedgerService};
use crate::domain::{Account, DateRange, Page, Statement, date_format};

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Coffer - account ledger with statement history
#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "Client accounts with deposits, withdrawals and paginated statements")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COFFER_DB", default_value = "coffer.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Open an account for a client
    Open {
        /// Client id (one account per client)
        client_id: String,

        /// Initial deposit
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        amount: i64,
    },

    /// Deposit money into an account
    Deposit {
        /// Account id
        account_id: String,

        /// Amount to deposit
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Account id
        account_id: String,

        /// Amount to withdraw
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// Show an account and its balance
    Show {
        /// Account id
        account_id: String,
    },

    /// List all accounts
    Accounts,

    /// List the statements of an account
    Statements {
        /// Account id
        account_id: String,

        /// Only statements at or after this date (dd/MM/yyyy HH:mm:ss, UTC)
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<DateTime<Utc>>,

        /// Only statements at or before this date (dd/MM/yyyy HH:mm:ss, UTC)
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<DateTime<Utc>>,

        /// Page number, starting at 0
        #[arg(short, long, allow_negative_numbers = true)]
        page: Option<i64>,

        /// Statements per page
        #[arg(short, long, allow_negative_numbers = true)]
        size: Option<i64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Export every account with its history as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn parse_date_arg(s: &str) -> Result<DateTime<Utc>, String> {
    date_format::parse(s).map_err(|e| format!("expected dd/MM/yyyy HH:mm:ss ({})", e))
}

/// Turn any failure into the error body printed on stderr.
pub fn error_report(err: &anyhow::Error) -> ErrorReport {
    match err.downcast_ref::<LedgerError>() {
        Some(ledger_err) => ErrorReport::new(ledger_err, Utc::now()),
        None => ErrorReport::internal(format!("{:#}", err), Utc::now()),
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                LedgerService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Open { client_id, amount } => {
                let service = LedgerService::connect(&self.database).await?;
                let account = service.create_account(&client_id, amount).await?;
                println!(
                    "Opened account {} for client {} with balance {}",
                    account.id, account.client_id, account.current_balance
                );
            }

            Commands::Deposit { account_id, amount } => {
                let service = LedgerService::connect(&self.database).await?;
                let statement = service.deposit(amount, &account_id).await?;
                println!(
                    "Deposited {} into {} (balance {})",
                    statement.amount, account_id, statement.account_balance
                );
            }

            Commands::Withdraw { account_id, amount } => {
                let service = LedgerService::connect(&self.database).await?;
                let statement = service.withdraw(amount, &account_id).await?;
                println!(
                    "Withdrew {} from {} (balance {})",
                    statement.amount, account_id, statement.account_balance
                );
            }

            Commands::Show { account_id } => {
                let service = LedgerService::connect(&self.database).await?;
                let account = service
                    .find_account_by_id(&account_id)
                    .await?
                    .ok_or_else(|| LedgerError::AccountNotFound(account_id.clone()))?;
                print_account(&account);
            }

            Commands::Accounts => {
                let service = LedgerService::connect(&self.database).await?;
                let accounts = service.list_accounts().await?;
                if accounts.is_empty() {
                    println!("No accounts found.");
                } else {
                    println!("{:<38} {:<20} {:>14}", "ID", "CLIENT", "BALANCE");
                    println!("{}", "-".repeat(74));
                    for account in accounts {
                        println!(
                            "{:<38} {:<20} {:>14}",
                            account.id, account.client_id, account.current_balance
                        );
                    }
                }
            }

            Commands::Statements {
                account_id,
                from,
                to,
                page,
                size,
                format,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let range = DateRange::new(from, to);
                run_statements_command(&service, &account_id, range, page, size, format).await?;
            }

            Commands::Export { output } => {
                let service = LedgerService::connect(&self.database).await?;
                run_export_command(&service, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

async fn run_statements_command(
    service: &LedgerService,
    account_id: &str,
    range: DateRange,
    page: Option<i64>,
    size: Option<i64>,
    format: OutputFormat,
) -> Result<()> {
    use crate::io::Exporter;
    use std::io::stdout;

    let paging = (page.is_some() || size.is_some())
        .then(|| (page.unwrap_or(0), size.unwrap_or(DEFAULT_PAGE_SIZE)));

    match format {
        OutputFormat::Csv => {
            if paging.is_some() {
                anyhow::bail!("CSV output always contains every matching statement; drop --page/--size");
            }
            Exporter::new(service)
                .export_statements_csv(account_id, range, stdout())
                .await?;
        }
        OutputFormat::Json => {
            Exporter::new(service)
                .export_statements_json(account_id, range, paging, stdout())
                .await?;
        }
        OutputFormat::Table => {
            let page = match paging {
                Some((page, size)) => {
                    service
                        .get_statements_page(account_id, range, page, size)
                        .await?
                }
                None => Page::single(service.get_statements(account_id, range).await?),
            };
            print_statements(&page, paging.is_some());
        }
    }

    Ok(())
}

async fn run_export_command(service: &LedgerService, output: Option<&str>) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = Exporter::new(service).export_full_json(writer).await?;
    if output.is_some() {
        eprintln!("Exported {} accounts", count);
    }
    Ok(())
}

fn print_account(account: &Account) {
    println!("Account: {}", account.id);
    println!("  Client:     {}", account.client_id);
    println!("  Balance:    {}", account.current_balance);
    println!("  Statements: {}", account.account_statements.len());
    if let Some(last) = account.last_statement() {
        println!(
            "  Last:       {} {} on {}",
            last.operation,
            last.amount,
            date_format::format(&last.operation_date)
        );
    }
}

fn print_statements(page: &Page<Statement>, paginated: bool) {
    if page.items.is_empty() {
        println!("No statements found.");
    } else {
        println!(
            "{:<20} {:<10} {:>14} {:>14}",
            "DATE", "OPERATION", "AMOUNT", "BALANCE"
        );
        println!("{}", "-".repeat(61));
        for statement in &page.items {
            println!(
                "{:<20} {:<10} {:>14} {:>14}",
                date_format::format(&statement.operation_date),
                statement.operation,
                statement.amount,
                statement.account_balance
            );
        }
    }

    if paginated {
        println!();
        println!(
            "Page {} of {} ({} statements){}",
            page.page + 1,
            page.total_pages,
            page.total_elements,
            if page.is_last() { "" } else { ", more with --page" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statements_command() {
        let cli = Cli::try_parse_from([
            "coffer",
            "statements",
            "acc-1",
            "--from",
            "01/01/2024 00:00:00",
            "--page",
            "1",
            "--size",
            "2",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Statements {
                account_id,
                from,
                to,
                page,
                size,
                format,
            } => {
                assert_eq!(account_id, "acc-1");
                assert_eq!(from.map(|d| date_format::format(&d)).as_deref(), Some("01/01/2024 00:00:00"));
                assert!(to.is_none());
                assert_eq!(page, Some(1));
                assert_eq!(size, Some(2));
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected statements command"),
        }
    }

    #[test]
    fn test_bad_date_is_a_usage_error() {
        let result = Cli::try_parse_from(["coffer", "statements", "acc-1", "--from", "2024-01-01"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_amount_reaches_the_ledger() {
        let cli = Cli::try_parse_from(["coffer", "deposit", "acc-1", "-5"]).unwrap();
        assert!(matches!(cli.command, Commands::Deposit { amount: -5, .. }));
    }

    #[test]
    fn test_error_report_for_ledger_errors() {
        let err = anyhow::Error::new(LedgerError::AccountNotFound("acc-1".into()));
        let report = error_report(&err);
        assert_eq!(report.code, 400);
        assert_eq!(report.message, "Account with id acc-1 does not exist");

        let other = anyhow::anyhow!("database is locked");
        assert_eq!(error_report(&other).code, 500);
    }

    fn ledger_error(err: &anyhow::Error) -> Option<&LedgerError> {
        err.downcast_ref::<LedgerError>()
    }

    #[tokio::test]
    async fn test_statements_check_account_before_paging_in_every_format() {
        let service = LedgerService::in_memory();

        for format in [OutputFormat::Json, OutputFormat::Table] {
            let err = run_statements_command(
                &service,
                "ghost",
                DateRange::unbounded(),
                None,
                Some(0),
                format,
            )
            .await
            .unwrap_err();
            assert!(
                matches!(ledger_error(&err), Some(LedgerError::AccountNotFound(id)) if id == "ghost"),
                "{:?}: {}",
                format,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_json_statements_check_range_before_paging() {
        let service = LedgerService::in_memory();
        let account = service.create_account("1", 0).await.unwrap();
        let reversed = DateRange::new(
            Some(date_format::parse("02/01/2024 00:00:00").unwrap()),
            Some(date_format::parse("01/01/2024 00:00:00").unwrap()),
        );

        let err = run_statements_command(
            &service,
            &account.id,
            reversed,
            Some(-1),
            Some(0),
            OutputFormat::Json,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            ledger_error(&err),
            Some(LedgerError::InvalidDateRange { .. })
        ));

        let err = run_statements_command(
            &service,
            &account.id,
            DateRange::unbounded(),
            Some(-1),
            Some(0),
            OutputFormat::Json,
        )
        .await
        .unwrap_err();
        assert!(matches!(ledger_error(&err), Some(LedgerError::InvalidPage(-1))));
    }
}
