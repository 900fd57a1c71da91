// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use coffer::LedgerService;
use coffer::domain::{Clock, date_format};
use tempfile::TempDir;

/// Helper to create an in-memory test service
pub fn test_service() -> LedgerService {
    LedgerService::in_memory()
}

/// Helper to create a test service with a temporary SQLite database
pub async fn sqlite_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a boundary date string (dd/MM/yyyy HH:mm:ss) into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    date_format::parse(date_str).unwrap()
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(date_str: &str) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(parse_date(date_str)),
        })
    }

    pub fn set(&self, date_str: &str) {
        *self.now.lock().unwrap() = parse_date(date_str);
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// In-memory service whose timestamps come from a manual clock.
pub fn service_with_clock(start: &str) -> (LedgerService, Arc<ManualClock>) {
    let clock = ManualClock::starting_at(start);
    let service = LedgerService::in_memory().with_clock(clock.clone());
    (service, clock)
}

/// Test fixture: the account from the worked example, client "1" opened
/// with 0, then a deposit of 100 and a withdrawal of 50.
pub async fn example_account(service: &LedgerService) -> Result<String> {
    let account = service.create_account("1", 0).await?;
    service.deposit(100, &account.id).await?;
    service.withdraw(50, &account.id).await?;
    Ok(account.id)
}
