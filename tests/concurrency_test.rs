mod common;

use anyhow::Result;
use coffer::application::{LedgerError, LedgerService};
use coffer::domain::DateRange;
use tokio::task::JoinSet;

use common::*;

/// Hammer one account with deposits and withdrawals from many tasks and check
/// that nothing was lost and the balance never went negative.
async fn assert_no_lost_updates(service: LedgerService) -> Result<()> {
    let account = service.create_account("shared", 100).await?;

    let mut tasks = JoinSet::new();
    for i in 0..50 {
        let service = service.clone();
        let id = account.id.clone();
        tasks.spawn(async move {
            if i % 2 == 0 {
                service.deposit(10, &id).await.map(|_| 10)
            } else {
                service.withdraw(15, &id).await.map(|_| -15)
            }
        });
    }

    let mut expected = 100;
    let mut successes = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(delta) => {
                expected += delta;
                successes += 1;
            }
            Err(LedgerError::InsufficientFunds { .. }) => {}
            Err(other) => return Err(other.into()),
        }
    }

    let account = service.find_account_by_id(&account.id).await?.unwrap();
    assert_eq!(account.current_balance, expected);
    assert_eq!(account.account_statements.len(), successes + 1);
    assert!(account.is_consistent());
    assert!(
        account
            .account_statements
            .iter()
            .all(|s| s.account_balance >= 0)
    );
    Ok(())
}

/// Race many creations for the same client; exactly one may win.
async fn assert_single_account_per_client(service: LedgerService) -> Result<()> {
    let mut tasks = JoinSet::new();
    for i in 0..20 {
        let service = service.clone();
        tasks.spawn(async move { service.create_account("racer", i).await });
    }

    let mut created = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(account) => created.push(account),
            Err(LedgerError::AccountAlreadyExists(client)) => assert_eq!(client, "racer"),
            Err(other) => return Err(other.into()),
        }
    }

    assert_eq!(created.len(), 1);
    let stored = service.find_account_by_client_id("racer").await?.unwrap();
    assert_eq!(stored.id, created[0].id);
    assert_eq!(service.list_accounts().await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_movements_in_memory() -> Result<()> {
    assert_no_lost_updates(test_service()).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_in_memory() -> Result<()> {
    assert_single_account_per_client(test_service()).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_movements_sqlite() -> Result<()> {
    let (service, _temp) = sqlite_service().await?;
    assert_no_lost_updates(service).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_sqlite() -> Result<()> {
    let (service, _temp) = sqlite_service().await?;
    assert_single_account_per_client(service).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_accounts_in_parallel() -> Result<()> {
    let service = test_service();
    let mut ids = Vec::new();
    for client in 0..8 {
        ids.push(service.create_account(&client.to_string(), 0).await?.id);
    }

    let mut tasks = JoinSet::new();
    for id in &ids {
        for _ in 0..25 {
            let service = service.clone();
            let id = id.clone();
            tasks.spawn(async move { service.deposit(4, &id).await });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    for id in &ids {
        assert_eq!(service.get_balance(id).await?, 100);
        assert_eq!(service.find_statements_by_account_id(id).await?.len(), 26);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_whole_statements() -> Result<()> {
    let service = test_service();
    let account = service.create_account("reader", 0).await?;

    let writer = {
        let service = service.clone();
        let id = account.id.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                service.deposit(1, &id).await?;
            }
            Ok::<_, LedgerError>(())
        })
    };

    for _ in 0..200 {
        let snapshot = service.find_account_by_id(&account.id).await?.unwrap();
        assert!(snapshot.is_consistent());

        let statements = service
            .get_statements(&account.id, DateRange::unbounded())
            .await?;
        assert_eq!(
            statements.last().map(|s| s.account_balance),
            Some(statements.len() as i64 - 1)
        );
    }

    writer.await??;
    assert_eq!(service.get_balance(&account.id).await?, 200);
    Ok(())
}
