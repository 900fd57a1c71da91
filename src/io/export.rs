use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Account, DateRange, Page, date_format};

/// Every account with its full history, for backups and inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub version: String,
    #[serde(with = "date_format")]
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
}

/// Exporter for turning ledger data into CSV or JSON.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export an account's statements to CSV, oldest first.
    pub async fn export_statements_csv<W: Write>(
        &self,
        account_id: &str,
        range: DateRange,
        writer: W,
    ) -> Result<usize> {
        let statements = self.service.get_statements(account_id, range).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["operation_date", "operation", "amount", "account_balance"])?;

        for statement in &statements {
            csv_writer.write_record([
                date_format::format(&statement.operation_date),
                statement.operation.to_string(),
                statement.amount.to_string(),
                statement.account_balance.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(statements.len())
    }

    /// Export a page of statements (or all of them) as a JSON page object.
    /// `paging` is the raw `(page, size)` pair; the ledger checks it after the
    /// account and the date range.
    pub async fn export_statements_json<W: Write>(
        &self,
        account_id: &str,
        range: DateRange,
        paging: Option<(i64, i64)>,
        mut writer: W,
    ) -> Result<usize> {
        let page = match paging {
            Some((page, size)) => {
                self.service
                    .get_statements_page(account_id, range, page, size)
                    .await?
            }
            None => Page::single(self.service.get_statements(account_id, range).await?),
        };
        serde_json::to_writer_pretty(&mut writer, &page)?;
        writeln!(writer)?;
        Ok(page.items.len())
    }

    /// Export every account to JSON.
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<usize> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            accounts: self.service.list_accounts().await?,
        };

        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writeln!(writer)?;
        Ok(snapshot.accounts.len())
    }
}
