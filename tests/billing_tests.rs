//! 账单集成测试：金额计算、分次付款、作废

mod common;

use common::Fixture;
use labdesk::errors::LabdeskError;
use labdesk::services::{BillFilter, BillItemInput, CreateBillRequest};
use labdesk::storage::BillStatus;

fn catalog_item(lab_test_id: i64) -> BillItemInput {
    BillItemInput {
        lab_test_id: Some(lab_test_id),
        description: None,
        amount: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bill_totals_from_catalog_and_free_items() {
    let fx = Fixture::new("billing_totals").await;
    let patient = fx.patient("Leela Menon", "9845012345").await;
    let visit = fx.diagnostics_visit(patient.id).await;

    let bill = fx
        .services
        .billing
        .create_bill(CreateBillRequest {
            visit_id: visit.id,
            items: vec![
                catalog_item(fx.hemoglobin.id),
                catalog_item(fx.urine.id),
                BillItemInput {
                    lab_test_id: None,
                    description: Some("Home collection".into()),
                    amount: Some(5_000),
                },
            ],
            discount_amount: 10_000,
        })
        .await
        .unwrap();

    assert!(bill.bill_number.starts_with("BIL-MAIN-"));
    assert_eq!(bill.gross_amount, 45_000);
    assert_eq!(bill.net_amount, 35_000);
    assert_eq!(bill.balance, 35_000);
    assert_eq!(bill.status, BillStatus::Unpaid);
    let items = bill.items.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].description, "Hemoglobin");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_discount_above_gross_is_rejected() {
    let fx = Fixture::new("billing_discount").await;
    let patient = fx.patient("Leela Menon", "9845012345").await;
    let visit = fx.diagnostics_visit(patient.id).await;

    let err = fx
        .services
        .billing
        .create_bill(CreateBillRequest {
            visit_id: visit.id,
            items: vec![catalog_item(fx.urine.id)],
            discount_amount: 15_001,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_payments_move_bill_to_paid() {
    let fx = Fixture::new("billing_payments").await;
    let patient = fx.patient("Farah Khan", "9812345678").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    let billing = fx.services.billing.clone();

    let bill = billing
        .create_bill(CreateBillRequest {
            visit_id: visit.id,
            items: vec![catalog_item(fx.hemoglobin.id)],
            discount_amount: 0,
        })
        .await
        .unwrap();

    let partial = billing.record_payment(bill.id, 10_000).await.unwrap();
    assert_eq!(partial.status, BillStatus::Partial);
    assert_eq!(partial.balance, 15_000);

    // 超出余额
    let err = billing.record_payment(bill.id, 20_000).await.unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));

    let paid = billing.record_payment(bill.id, 15_000).await.unwrap();
    assert_eq!(paid.status, BillStatus::Paid);
    assert_eq!(paid.balance, 0);

    let err = billing.record_payment(bill.id, 1).await.unwrap_err();
    assert!(matches!(err, LabdeskError::Conflict(_)));

    // 已收款的账单不能作废
    let err = billing.cancel_bill(bill.id).await.unwrap_err();
    assert!(matches!(err, LabdeskError::Conflict(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_bill_takes_no_payment() {
    let fx = Fixture::new("billing_cancel").await;
    let patient = fx.patient("Farah Khan", "9812345678").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    let billing = fx.services.billing.clone();

    let bill = billing
        .create_bill(CreateBillRequest {
            visit_id: visit.id,
            items: vec![catalog_item(fx.urine.id)],
            discount_amount: 0,
        })
        .await
        .unwrap();
    let cancelled = billing.cancel_bill(bill.id).await.unwrap();
    assert_eq!(cancelled.status, BillStatus::Cancelled);

    let err = billing.record_payment(bill.id, 100).await.unwrap_err();
    assert!(matches!(err, LabdeskError::Conflict(_)));

    let listed = billing
        .list_bills(BillFilter {
            visit_id: Some(visit.id),
            status: Some(BillStatus::Cancelled),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
}
