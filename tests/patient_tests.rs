//! 患者建档集成测试：查重、标识、并发建档

mod common;

use futures_util::future::join_all;

use common::{Fixture, patient_request};
use labdesk::errors::LabdeskError;
use labdesk::services::{
    DuplicateCheckRequest, IdentifierInput, MatchStrength, PatientFilter, UpdatePatientRequest,
};

#[tokio::test(flavor = "multi_thread")]
async fn test_exact_match_returns_existing_patient() {
    let fx = Fixture::new("patient_exact").await;
    let patients = fx.services.patients.clone();

    let first = patients
        .create_patient(patient_request(fx.branch.id, "Asha Rao", "98765 43210"))
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.patient.patient_number, "PAT-MAIN-000001");

    // 同名同号，格式不同也算精确匹配
    let second = patients
        .create_patient(patient_request(fx.branch.id, "  asha   RAO ", "+91-98765-43210"))
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.patient.id, first.patient.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exact_match_found_behind_many_namesakes() {
    let fx = Fixture::new("patient_namesakes").await;
    let patients = fx.services.patients.clone();
    let cap = labdesk::config::get_config().patients.max_candidates;

    // 同名不同号的记录先填满候选上限
    for i in 0..cap {
        let mut req = patient_request(fx.branch.id, "Ravi Kumar", &format!("90000{:05}", i));
        req.allow_duplicate = true;
        assert!(patients.create_patient(req).await.unwrap().created);
    }

    let mut req = patient_request(fx.branch.id, "Ravi Kumar", "9876543210");
    req.allow_duplicate = true;
    let target = patients.create_patient(req).await.unwrap();
    assert!(target.created);

    let again = patients
        .create_patient(patient_request(fx.branch.id, "Ravi Kumar", "9876543210"))
        .await
        .unwrap();
    assert!(!again.created);
    assert_eq!(again.patient.id, target.patient.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_probable_duplicate_is_refused_with_candidates() {
    let fx = Fixture::new("patient_probable").await;
    let existing = fx.patient("Asha Rao", "9876543210").await;

    let err = fx
        .services
        .patients
        .create_patient(patient_request(fx.branch.id, "Asha Kumari Rao", "9876543210"))
        .await
        .unwrap_err();

    match &err {
        LabdeskError::DuplicatePatient { candidates, .. } => {
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].patient_id, existing.id);
            assert_eq!(candidates[0].strength, MatchStrength::Probable);
        }
        other => panic!("expected DuplicatePatient, got {:?}", other),
    }
    assert_eq!(err.http_status(), actix_web::http::StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_allow_duplicate_overrides_probable_match() {
    let fx = Fixture::new("patient_override").await;
    fx.patient("Asha Rao", "9876543210").await;

    let mut req = patient_request(fx.branch.id, "Asha Kumari Rao", "9876543210");
    req.allow_duplicate = true;
    let outcome = fx.services.patients.create_patient(req).await.unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.patient.patient_number, "PAT-MAIN-000002");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_find_duplicates_ranks_candidates() {
    let fx = Fixture::new("patient_find").await;
    let same = fx.patient("Ravi Kumar", "9000000001").await;
    fx.patient("Meena Das", "9000000001").await;
    fx.patient("Ravi Kumar", "9111111111").await;

    let found = fx
        .services
        .patients
        .find_duplicates(DuplicateCheckRequest {
            full_name: "Ravi Kumar".into(),
            phone: "9000000001".into(),
            date_of_birth: None,
        })
        .await
        .unwrap();

    assert_eq!(found[0].patient_id, same.id);
    assert_eq!(found[0].strength, MatchStrength::Exact);
    assert!(found.iter().all(|c| c.phone.ends_with("0001")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_registration_creates_one_record() {
    let fx = Fixture::new("patient_concurrent").await;
    let patients = fx.services.patients.clone();

    let attempts = (0..4).map(|_| {
        let patients = patients.clone();
        let req = patient_request(fx.branch.id, "Kiran Shah", "9822001122");
        async move { patients.create_patient(req).await }
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.created).count(), 1);
    let id = outcomes[0].patient.id;
    assert!(outcomes.iter().all(|o| o.patient.id == id));

    let listed = patients
        .list_patients(PatientFilter {
            search: Some("kiran".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_one_primary_identifier_per_type() {
    let fx = Fixture::new("patient_identifiers").await;
    let patient = fx.patient("Nisha Paul", "9988776655").await;
    let patients = fx.services.patients.clone();

    let first = patients
        .add_identifier(
            patient.id,
            IdentifierInput {
                id_type: "AADHAAR".into(),
                value: "1111-2222-3333".into(),
                is_primary: true,
            },
        )
        .await
        .unwrap();
    let second = patients
        .add_identifier(
            patient.id,
            IdentifierInput {
                id_type: "AADHAAR".into(),
                value: "4444-5555-6666".into(),
                is_primary: true,
            },
        )
        .await
        .unwrap();
    assert!(second.is_primary);

    let listed = patients.list_identifiers(patient.id).await.unwrap();
    let primaries: Vec<_> = listed.iter().filter(|i| i.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, second.id);

    patients
        .set_primary_identifier(patient.id, first.id)
        .await
        .unwrap();
    let listed = patients.list_identifiers(patient.id).await.unwrap();
    let primary = listed.iter().find(|i| i.is_primary).unwrap();
    assert_eq!(primary.id, first.id);
    assert_eq!(listed.iter().filter(|i| i.is_primary).count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_patient_rejects_short_phone() {
    let fx = Fixture::new("patient_update").await;
    let patient = fx.patient("Arjun Nair", "9876501234").await;

    let err = fx
        .services
        .patients
        .update_patient(
            patient.id,
            UpdatePatientRequest {
                phone: Some("12345".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LabdeskError::Validation(_)));

    let updated = fx
        .services
        .patients
        .update_patient(
            patient.id,
            UpdatePatientRequest {
                address: Some("4 Hill View".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.address.as_deref(), Some("4 Hill View"));
    assert_eq!(updated.patient_number, patient.patient_number);
}
