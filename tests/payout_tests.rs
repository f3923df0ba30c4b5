//! 医生结算集成测试：按转诊/门诊计算、重算、付款后锁定、CSV 导出

mod common;

use chrono::{Duration, Utc};
use futures_util::future::join_all;
use migration::entities::doctor_payout_ledger;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};

use common::Fixture;
use labdesk::errors::LabdeskError;
use labdesk::services::{
    BillItemInput, ComputePayoutRequest, CreateBillRequest, LedgerFilter,
};
use labdesk::storage::{LedgerStatus, PayoutBasis};

fn today_request(doctor_id: i64) -> ComputePayoutRequest {
    let today = Utc::now().date_naive();
    ComputePayoutRequest {
        doctor_id,
        period_start: today - Duration::days(1),
        period_end: today + Duration::days(1),
    }
}

async fn bill_visit(fx: &Fixture, visit_id: i64, amount: i64, discount: i64) -> i64 {
    fx.services
        .billing
        .create_bill(CreateBillRequest {
            visit_id,
            items: vec![BillItemInput {
                lab_test_id: None,
                description: Some("Services".into()),
                amount: Some(amount),
            }],
            discount_amount: discount,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test(flavor = "multi_thread")]
async fn test_referral_commission_on_net_amount() {
    let fx = Fixture::new("payout_referral").await;
    let patient = fx.patient("Sunil Joshi", "9765400011").await;
    let first = fx.diagnostics_visit(patient.id).await;
    let second = fx.diagnostics_visit(patient.id).await;
    bill_visit(&fx, first.id, 40_000, 5_000).await;
    bill_visit(&fx, second.id, 12_345, 0).await;

    // 作废账单不计入
    let cancelled = bill_visit(&fx, second.id, 99_999, 0).await;
    fx.services.billing.cancel_bill(cancelled).await.unwrap();

    let ledger = fx
        .services
        .payouts
        .compute(today_request(fx.referral.id))
        .await
        .unwrap();

    assert_eq!(ledger.basis, PayoutBasis::Referral);
    assert_eq!(ledger.status, LedgerStatus::Pending);
    assert_eq!(ledger.bill_count, 2);
    assert_eq!(ledger.gross_amount, 35_000 + 12_345);
    // 10%: 3500 + 1234.5 → 1235
    assert_eq!(ledger.payout_amount, 3_500 + 1_235);
    assert_eq!(ledger.lines.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_clinic_share_and_pathologist_rejected() {
    let fx = Fixture::new("payout_clinic").await;
    let patient = fx.patient("Sunil Joshi", "9765400011").await;
    let visit = fx.clinic_visit(patient.id).await;
    bill_visit(&fx, visit.id, 50_000, 0).await;

    let ledger = fx
        .services
        .payouts
        .compute(today_request(fx.clinic.id))
        .await
        .unwrap();
    assert_eq!(ledger.basis, PayoutBasis::Clinic);
    assert_eq!(ledger.payout_amount, 30_000);

    let err = fx
        .services
        .payouts
        .compute(today_request(fx.pathologist.id))
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pending_ledger_is_recomputed_in_place() {
    let fx = Fixture::new("payout_recompute").await;
    let patient = fx.patient("Sunil Joshi", "9765400011").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    bill_visit(&fx, visit.id, 10_000, 0).await;
    let payouts = fx.services.payouts.clone();

    let first = payouts.compute(today_request(fx.referral.id)).await.unwrap();
    bill_visit(&fx, visit.id, 20_000, 0).await;
    let second = payouts.compute(today_request(fx.referral.id)).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.bill_count, 2);
    assert_eq!(second.payout_amount, 3_000);

    let listed = payouts
        .list_ledgers(LedgerFilter {
            doctor_id: Some(fx.referral.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_compute_keeps_one_ledger() {
    let fx = Fixture::new("payout_concurrent").await;
    let patient = fx.patient("Sunil Joshi", "9765400011").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    bill_visit(&fx, visit.id, 10_000, 0).await;
    let payouts = fx.services.payouts.clone();

    let runs = (0..4).map(|_| {
        let payouts = payouts.clone();
        let req = today_request(fx.referral.id);
        async move { payouts.compute(req).await }
    });
    let ledgers: Vec<_> = join_all(runs)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let id = ledgers[0].id;
    assert!(ledgers.iter().all(|l| l.id == id && l.payout_amount == 1_000));
    let listed = payouts
        .list_ledgers(LedgerFilter {
            doctor_id: Some(fx.referral.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_ledger_for_same_period_is_rejected_by_schema() {
    let fx = Fixture::new("payout_unique_period").await;
    let ledger = fx
        .services
        .payouts
        .compute(today_request(fx.referral.id))
        .await
        .unwrap();

    let now = Utc::now();
    let err = doctor_payout_ledger::ActiveModel {
        doctor_id: Set(fx.referral.id),
        basis: Set(PayoutBasis::Referral.to_string()),
        period_start: Set(ledger.period_start),
        period_end: Set(ledger.period_end),
        gross_amount: Set(0),
        payout_amount: Set(0),
        bill_count: Set(0),
        lines: Set("[]".into()),
        status: Set(LedgerStatus::Pending.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(fx.storage.get_db())
    .await
    .unwrap_err();

    assert!(matches!(LabdeskError::from(err), LabdeskError::Conflict(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paid_ledger_is_locked() {
    let fx = Fixture::new("payout_paid").await;
    let patient = fx.patient("Sunil Joshi", "9765400011").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    bill_visit(&fx, visit.id, 10_000, 0).await;
    let payouts = fx.services.payouts.clone();

    let ledger = payouts.compute(today_request(fx.referral.id)).await.unwrap();
    let paid = payouts.mark_paid(ledger.id, "NEFT-0042").await.unwrap();
    assert_eq!(paid.status, LedgerStatus::Paid);
    assert_eq!(paid.paid_reference.as_deref(), Some("NEFT-0042"));
    assert!(paid.paid_at.is_some());

    let err = payouts.mark_paid(ledger.id, "again").await.unwrap_err();
    assert!(matches!(err, LabdeskError::LedgerPaid(_)));
    let err = payouts.delete_ledger(ledger.id).await.unwrap_err();
    assert!(matches!(err, LabdeskError::LedgerPaid(_)));
    // 与已付账期重叠
    let err = payouts
        .compute(today_request(fx.referral.id))
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::LedgerPaid(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_csv_has_header_and_rows() {
    let fx = Fixture::new("payout_csv").await;
    let patient = fx.patient("Sunil Joshi", "9765400011").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    bill_visit(&fx, visit.id, 10_000, 0).await;
    let payouts = fx.services.payouts.clone();

    let ledger = payouts.compute(today_request(fx.referral.id)).await.unwrap();
    let csv = payouts.export_csv(ledger.id).await.unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(
        lines[0],
        "bill_number,visit_number,billed_at,net_amount,rate_bp,payout_amount"
    );
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("BIL-MAIN-"));
    assert!(lines[1].ends_with(",10000,1000,1000"));

    payouts.delete_ledger(ledger.id).await.unwrap();
    let err = payouts.get_ledger(ledger.id).await.unwrap_err();
    assert!(matches!(err, LabdeskError::NotFound(_)));
}
