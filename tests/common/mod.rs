//! 集成测试共享的环境和种子数据
#![allow(dead_code)]

use std::sync::{Arc, Once};

use tempfile::TempDir;

use labdesk::config::init_config;
use labdesk::services::{
    AppServices, BranchView, CreateBranchRequest, CreateDoctorRequest, CreateLabTestRequest,
    CreatePatientRequest, CreateVisitRequest, DoctorView, LabTestView, PatientView, VisitView,
};
use labdesk::storage::{DoctorKind, SeaOrmStorage, VisitDomain};

static INIT: Once = Once::new();

pub fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

/// 每个测试一个独立的 SQLite 文件，TempDir 必须活到测试结束
pub async fn create_temp_storage(name: &str) -> (Arc<SeaOrmStorage>, TempDir) {
    init_static_config();
    let td = TempDir::new().unwrap();
    let p = td.path().join(format!("{}.db", name));
    let u = format!("sqlite://{}?mode=rwc", p.display());
    let s = SeaOrmStorage::new(&u, "sqlite").await.unwrap();
    (Arc::new(s), td)
}

/// A branch, one doctor of each kind and two priced lab tests
pub struct Fixture {
    pub storage: Arc<SeaOrmStorage>,
    pub services: AppServices,
    pub branch: BranchView,
    pub referral: DoctorView,
    pub clinic: DoctorView,
    pub pathologist: DoctorView,
    pub hemoglobin: LabTestView,
    pub urine: LabTestView,
    _dir: TempDir,
}

impl Fixture {
    pub async fn new(name: &str) -> Self {
        let (storage, dir) = create_temp_storage(name).await;
        let services = AppServices::new(storage.clone());
        let catalog = services.catalog.clone();

        let branch = catalog
            .create_branch(CreateBranchRequest {
                code: "main".into(),
                name: "Main Branch".into(),
                address: Some("12 Lake Road".into()),
                phone: None,
            })
            .await
            .unwrap();
        let referral = catalog
            .create_doctor(doctor("Dr. Mehta", DoctorKind::Referral, 1_000, 0))
            .await
            .unwrap();
        let clinic = catalog
            .create_doctor(doctor("Dr. Iyer", DoctorKind::Clinic, 0, 6_000))
            .await
            .unwrap();
        let pathologist = catalog
            .create_doctor(doctor("Dr. Sen", DoctorKind::Pathologist, 0, 0))
            .await
            .unwrap();
        let hemoglobin = catalog
            .create_lab_test(CreateLabTestRequest {
                code: "HB".into(),
                name: "Hemoglobin".into(),
                unit: Some("g/dL".into()),
                ref_low: Some(12.0),
                ref_high: Some(16.0),
                price: 25_000,
            })
            .await
            .unwrap();
        let urine = catalog
            .create_lab_test(CreateLabTestRequest {
                code: "URINE".into(),
                name: "Urine Routine".into(),
                unit: None,
                ref_low: None,
                ref_high: None,
                price: 15_000,
            })
            .await
            .unwrap();

        Self {
            storage,
            services,
            branch,
            referral,
            clinic,
            pathologist,
            hemoglobin,
            urine,
            _dir: dir,
        }
    }

    pub async fn patient(&self, full_name: &str, phone: &str) -> PatientView {
        self.services
            .patients
            .create_patient(patient_request(self.branch.id, full_name, phone))
            .await
            .unwrap()
            .patient
    }

    /// Diagnostics visit referred by the fixture's referral doctor, both tests ordered
    pub async fn diagnostics_visit(&self, patient_id: i64) -> VisitView {
        self.services
            .visits
            .create_visit(CreateVisitRequest {
                branch_id: self.branch.id,
                patient_id,
                domain: VisitDomain::Diagnostics,
                referring_doctor_id: Some(self.referral.id),
                consulting_doctor_id: None,
                notes: None,
                visited_at: None,
                test_ids: vec![self.hemoglobin.id, self.urine.id],
            })
            .await
            .unwrap()
    }

    pub async fn clinic_visit(&self, patient_id: i64) -> VisitView {
        self.services
            .visits
            .create_visit(CreateVisitRequest {
                branch_id: self.branch.id,
                patient_id,
                domain: VisitDomain::Clinic,
                referring_doctor_id: None,
                consulting_doctor_id: Some(self.clinic.id),
                notes: Some("fever, 3 days".into()),
                visited_at: None,
                test_ids: Vec::new(),
            })
            .await
            .unwrap()
    }
}

pub fn doctor(name: &str, kind: DoctorKind, commission_bp: i32, share_bp: i32) -> CreateDoctorRequest {
    CreateDoctorRequest {
        name: name.into(),
        kind,
        qualification: None,
        registration_no: None,
        phone: None,
        commission_bp,
        consultation_share_bp: share_bp,
    }
}

pub fn patient_request(branch_id: i64, full_name: &str, phone: &str) -> CreatePatientRequest {
    CreatePatientRequest {
        branch_id,
        full_name: full_name.into(),
        phone: phone.into(),
        date_of_birth: None,
        sex: None,
        address: None,
        identifiers: Vec::new(),
        allow_duplicate: false,
    }
}
