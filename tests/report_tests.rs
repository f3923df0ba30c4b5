//! 报告生命周期集成测试：草稿、定稿、快照不可变、修订

mod common;

use futures_util::future::join;

use common::Fixture;
use labdesk::errors::LabdeskError;
use labdesk::services::{RecordResultRequest, UpdatePatientRequest, VisitView};
use labdesk::storage::{ReportStatus, ResultFlag};

async fn record_all(fx: &Fixture, visit: &VisitView, hb_value: &str) {
    for order in visit.orders.as_ref().unwrap() {
        let value = if order.test_code == "HB" {
            hb_value
        } else {
            "Protein: present"
        };
        fx.services
            .orders
            .record_result(
                order.id,
                RecordResultRequest {
                    value: value.into(),
                    remarks: None,
                },
            )
            .await
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_finalize_requires_complete_results() {
    let fx = Fixture::new("report_incomplete").await;
    let patient = fx.patient("Devika Pillai", "9447001122").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    let reports = fx.services.reports.clone();

    let draft = reports.create_draft(visit.id).await.unwrap();
    assert_eq!(draft.status, ReportStatus::Draft);
    assert_eq!(draft.version, 1);
    assert!(draft.snapshot.is_none());

    // 同一就诊再次请求返回同一草稿
    let again = reports.create_draft(visit.id).await.unwrap();
    assert_eq!(again.id, draft.id);

    let err = reports
        .finalize(draft.id, fx.pathologist.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::ReportIncomplete(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_only_pathologists_sign() {
    let fx = Fixture::new("report_signer").await;
    let patient = fx.patient("Devika Pillai", "9447001122").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    record_all(&fx, &visit, "14.1").await;

    let draft = fx.services.reports.create_draft(visit.id).await.unwrap();
    let err = fx
        .services
        .reports
        .finalize(draft.id, fx.referral.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_finalized_report_is_frozen() {
    let fx = Fixture::new("report_frozen").await;
    let patient = fx.patient("Devika Pillai", "9447001122").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    record_all(&fx, &visit, "17.0").await;
    let reports = fx.services.reports.clone();

    let draft = reports.create_draft(visit.id).await.unwrap();
    let finalized = reports.finalize(draft.id, fx.pathologist.id).await.unwrap();
    assert_eq!(finalized.status, ReportStatus::Finalized);
    assert_eq!(finalized.signed_by_doctor_id, Some(fx.pathologist.id));

    let snapshot = finalized.snapshot.unwrap();
    let issued_by = snapshot.patient.lab_name.clone();
    assert!(!issued_by.is_empty());
    assert_eq!(snapshot.patient.full_name, "Devika Pillai");
    assert_eq!(snapshot.patient.referring_doctor.as_deref(), Some("Dr. Mehta"));
    let hb = snapshot
        .results
        .lines
        .iter()
        .find(|l| l.test_code == "HB")
        .unwrap();
    assert_eq!(hb.flag, Some(ResultFlag::High));
    assert_eq!(snapshot.signature.unwrap().doctor_name, "Dr. Sen");

    // 定稿后修改患者资料和结果，不影响报告
    fx.services
        .patients
        .update_patient(
            patient.id,
            UpdatePatientRequest {
                full_name: Some("Devika P Nair".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    record_all(&fx, &visit, "13.0").await;
    labdesk::config::update_config(|c| c.reports.lab_name = "Renamed Pathology".into());

    let html = reports.render_html(finalized.id).await.unwrap();
    labdesk::config::update_config(|c| c.reports.lab_name = issued_by.clone());
    assert!(html.contains(&issued_by));
    assert!(!html.contains("Renamed Pathology"));
    assert!(html.contains("Devika Pillai"));
    assert!(!html.contains("Devika P Nair"));
    assert!(html.contains("17.0"));
    assert!(!html.contains("DRAFT"));

    let err = reports
        .finalize(finalized.id, fx.pathologist.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::ReportFinalized(_)));
    let err = reports.delete_report(finalized.id).await.unwrap_err();
    assert!(matches!(err, LabdeskError::ReportFinalized(_)));
    let err = reports.create_draft(visit.id).await.unwrap_err();
    assert!(matches!(err, LabdeskError::ReportFinalized(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_amend_opens_next_version() {
    let fx = Fixture::new("report_amend").await;
    let patient = fx.patient("Devika Pillai", "9447001122").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    record_all(&fx, &visit, "11.0").await;
    let reports = fx.services.reports.clone();

    let draft = reports.create_draft(visit.id).await.unwrap();
    let v1 = reports.finalize(draft.id, fx.pathologist.id).await.unwrap();

    let v2 = reports.amend(v1.id).await.unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(v2.report_number, v1.report_number);
    assert_eq!(v2.status, ReportStatus::Draft);

    // v1 已有后续版本，不能再次修订
    let err = reports.amend(v1.id).await.unwrap_err();
    assert!(matches!(err, LabdeskError::Conflict(_)));

    record_all(&fx, &visit, "12.5").await;
    let v2 = reports.finalize(v2.id, fx.pathologist.id).await.unwrap();
    let hb = |view: &labdesk::services::ReportView| {
        view.snapshot
            .as_ref()
            .unwrap()
            .results
            .lines
            .iter()
            .find(|l| l.test_code == "HB")
            .and_then(|l| l.value.clone())
    };
    assert_eq!(hb(&v2).as_deref(), Some("12.5"));

    let versions = reports.list_versions(visit.id).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(hb(&versions[0]).as_deref(), Some("11.0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_draft_render_escapes_html() {
    let fx = Fixture::new("report_escape").await;
    let patient = fx.patient("<script>alert(1)</script>", "9447001199").await;
    let visit = fx.diagnostics_visit(patient.id).await;

    let draft = fx.services.reports.create_draft(visit.id).await.unwrap();
    let html = fx.services.reports.render_html(draft.id).await.unwrap();

    assert!(html.contains("DRAFT"));
    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;"));

    fx.services.reports.delete_report(draft.id).await.unwrap();
    let err = fx.services.reports.get_report(draft.id).await.unwrap_err();
    assert!(matches!(err, LabdeskError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_finalize_has_one_winner() {
    let fx = Fixture::new("report_finalize_race").await;
    let patient = fx.patient("Devika Pillai", "9447001122").await;
    let visit = fx.diagnostics_visit(patient.id).await;
    record_all(&fx, &visit, "14.1").await;
    let reports = fx.services.reports.clone();
    let draft = reports.create_draft(visit.id).await.unwrap();

    let (a, b) = join(
        reports.finalize(draft.id, fx.pathologist.id),
        reports.finalize(draft.id, fx.pathologist.id),
    )
    .await;
    let outcomes = [a, b];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(LabdeskError::ReportFinalized(_))))
    );
    let stored = reports.get_report(draft.id).await.unwrap();
    assert_eq!(stored.status, ReportStatus::Finalized);
}
