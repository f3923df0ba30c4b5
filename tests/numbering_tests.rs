//! 流水号集成测试：连续、按分支隔离、回滚归还、并发与争用

mod common;

use chrono::{Datelike, Utc};
use futures_util::future::join_all;
use sea_orm::TransactionTrait;
use tempfile::TempDir;

use common::{Fixture, create_temp_storage, init_static_config};
use labdesk::errors::LabdeskError;
use labdesk::services::{CreateVisitRequest, NumberGenerator, NumberKind};
use labdesk::storage::{SeaOrmStorage, VisitDomain};

fn generator() -> NumberGenerator {
    NumberGenerator::new(5, 1, 10)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_numbers_are_gapless_per_branch() {
    let (storage, _td) = create_temp_storage("numbering_gapless").await;
    let numbers = generator();
    let year = Utc::now().year();

    for expected in 1..=3 {
        let txn = storage.get_db().begin().await.unwrap();
        let number = numbers.next(&txn, NumberKind::Bill, "MAIN").await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(number, format!("BIL-MAIN-{}-{:06}", year, expected));
    }

    // 另一个分支从 1 开始
    let txn = storage.get_db().begin().await.unwrap();
    let other = numbers.next(&txn, NumberKind::Bill, "EAST").await.unwrap();
    txn.commit().await.unwrap();
    assert_eq!(other, format!("BIL-EAST-{}-000001", year));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rolled_back_number_is_reused() {
    let (storage, _td) = create_temp_storage("numbering_rollback").await;
    let numbers = generator();

    let txn = storage.get_db().begin().await.unwrap();
    let first = numbers.next(&txn, NumberKind::Patient, "MAIN").await.unwrap();
    txn.rollback().await.unwrap();

    let txn = storage.get_db().begin().await.unwrap();
    let again = numbers.next(&txn, NumberKind::Patient, "MAIN").await.unwrap();
    txn.commit().await.unwrap();

    assert_eq!(first, "PAT-MAIN-000001");
    assert_eq!(again, first);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_kinds_use_separate_sequences() {
    let (storage, _td) = create_temp_storage("numbering_kinds").await;
    let numbers = generator();

    let txn = storage.get_db().begin().await.unwrap();
    let a = numbers.allocate(&txn, "VIS:MAIN:2026").await.unwrap();
    let b = numbers.allocate(&txn, "VIS:MAIN:2026").await.unwrap();
    let c = numbers.allocate(&txn, "REP:MAIN:2026").await.unwrap();
    txn.commit().await.unwrap();

    assert_eq!((a, b, c), (1, 2, 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_visits_get_gapless_numbers() {
    let fx = Fixture::new("numbering_concurrent").await;
    let patient = fx.patient("Leela Menon", "9845012345").await;
    let visits = fx.services.visits.clone();
    let year = Utc::now().year();
    const N: usize = 20;

    let creates = (0..N).map(|_| {
        let visits = visits.clone();
        let req = CreateVisitRequest {
            branch_id: fx.branch.id,
            patient_id: patient.id,
            domain: VisitDomain::Diagnostics,
            referring_doctor_id: None,
            consulting_doctor_id: None,
            notes: None,
            visited_at: None,
            test_ids: Vec::new(),
        };
        async move { visits.create_visit(req).await }
    });
    let mut numbers: Vec<String> = join_all(creates)
        .await
        .into_iter()
        .map(|r| r.unwrap().visit_number)
        .collect();
    numbers.sort();

    let expected: Vec<String> = (1..=N)
        .map(|n| format!("VIS-MAIN-{}-{:06}", year, n))
        .collect();
    assert_eq!(numbers, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_contended_sequence_gives_up_after_max_attempts() {
    init_static_config();
    let td = TempDir::new().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        td.path().join("numbering_contention.db").display()
    );
    // 两个独立连接池指向同一个文件
    let holder = SeaOrmStorage::new(&url, "sqlite").await.unwrap();
    let contender = SeaOrmStorage::new(&url, "sqlite").await.unwrap();

    let held = holder.get_db().begin().await.unwrap();
    generator().allocate(&held, "BIL:MAIN:2026").await.unwrap();

    let txn = contender.get_db().begin().await.unwrap();
    let err = NumberGenerator::new(1, 1, 1)
        .allocate(&txn, "BIL:MAIN:2026")
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::SequenceContention(_)));
    txn.rollback().await.unwrap();

    held.commit().await.unwrap();
    let txn = contender.get_db().begin().await.unwrap();
    let next = generator().allocate(&txn, "BIL:MAIN:2026").await.unwrap();
    txn.commit().await.unwrap();
    assert_eq!(next, 2);
}
