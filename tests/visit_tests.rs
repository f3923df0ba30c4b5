//! 就诊与检验单集成测试

mod common;

use common::Fixture;
use labdesk::errors::LabdeskError;
use labdesk::services::{CreateVisitRequest, RecordResultRequest, VisitFilter};
use labdesk::storage::{OrderStatus, ResultFlag, VisitDomain, VisitStatus};

#[tokio::test(flavor = "multi_thread")]
async fn test_visit_doctor_rules() {
    let fx = Fixture::new("visit_doctors").await;
    let patient = fx.patient("Omar Ali", "9700011122").await;
    let visits = fx.services.visits.clone();

    // CLINIC 就诊必须有 CLINIC 医生
    let err = visits
        .create_visit(CreateVisitRequest {
            branch_id: fx.branch.id,
            patient_id: patient.id,
            domain: VisitDomain::Clinic,
            referring_doctor_id: None,
            consulting_doctor_id: Some(fx.pathologist.id),
            notes: None,
            visited_at: None,
            test_ids: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));

    // 转诊医生必须是 REFERRAL
    let err = visits
        .create_visit(CreateVisitRequest {
            branch_id: fx.branch.id,
            patient_id: patient.id,
            domain: VisitDomain::Diagnostics,
            referring_doctor_id: Some(fx.clinic.id),
            consulting_doctor_id: None,
            notes: None,
            visited_at: None,
            test_ids: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));

    let clinic = fx.clinic_visit(patient.id).await;
    assert_eq!(clinic.domain, VisitDomain::Clinic);
    assert_eq!(clinic.status, VisitStatus::Open);
    assert!(clinic.visit_number.starts_with("VIS-MAIN-"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_visit_takes_no_orders() {
    let fx = Fixture::new("visit_cancel").await;
    let patient = fx.patient("Omar Ali", "9700011122").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    assert_eq!(visit.orders.as_ref().map(Vec::len), Some(2));

    let cancelled = fx
        .services
        .visits
        .update_status(visit.id, VisitStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, VisitStatus::Cancelled);

    let err = fx
        .services
        .orders
        .add_orders(visit.id, vec![fx.urine.id])
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));

    // 已取消就诊的检验单也不能再录结果
    let order_id = visit.orders.as_ref().unwrap()[0].id;
    let err = fx
        .services
        .orders
        .record_result(
            order_id,
            RecordResultRequest {
                value: "13.0".into(),
                remarks: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));

    let err = fx
        .services
        .visits
        .update_status(visit.id, VisitStatus::Open)
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));

    let open = fx
        .services
        .visits
        .list_visits(VisitFilter {
            patient_id: Some(patient.id),
            status: Some(VisitStatus::Open),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(open.total, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_results_are_flagged_and_replaced() {
    let fx = Fixture::new("visit_results").await;
    let patient = fx.patient("Grace Thomas", "9633221100").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    let orders = visit.orders.unwrap();
    let hb = orders.iter().find(|o| o.test_code == "HB").unwrap();
    let urine = orders.iter().find(|o| o.test_code == "URINE").unwrap();
    let service = fx.services.orders.clone();

    let low = service
        .record_result(
            hb.id,
            RecordResultRequest {
                value: "10.2".into(),
                remarks: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(low.flag, ResultFlag::Low);
    assert_eq!(low.numeric_value, Some(10.2));

    // 重录结果覆盖旧值
    let normal = service
        .record_result(
            hb.id,
            RecordResultRequest {
                value: "13.5".into(),
                remarks: Some("repeat sample".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(normal.id, low.id);
    assert_eq!(normal.flag, ResultFlag::Normal);

    let text = service
        .record_result(
            urine.id,
            RecordResultRequest {
                value: "Sugar: not detected".into(),
                remarks: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(text.flag, ResultFlag::Normal);

    let rows = service.list_results(visit.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.order_status == OrderStatus::Resulted));
    assert!(rows.iter().all(|r| r.result.is_some()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_only_pending_orders_can_be_cancelled() {
    let fx = Fixture::new("visit_order_cancel").await;
    let patient = fx.patient("Grace Thomas", "9633221100").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    let orders = visit.orders.unwrap();
    let service = fx.services.orders.clone();

    let cancelled = service.cancel_order(orders[0].id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let err = service
        .record_result(
            orders[0].id,
            RecordResultRequest {
                value: "1".into(),
                remarks: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));

    service
        .record_result(
            orders[1].id,
            RecordResultRequest {
                value: "positive".into(),
                remarks: None,
            },
        )
        .await
        .unwrap();
    let err = service.cancel_order(orders[1].id).await.unwrap_err();
    assert!(matches!(err, LabdeskError::Conflict(_)));
}
