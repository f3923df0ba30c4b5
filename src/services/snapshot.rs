//! Frozen report content
//!
//! A finalized report renders only from these structures, serialized into
//! the three snapshot columns. Later edits to the patient, the catalog or
//! the results never reach a finalized report.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use migration::entities::{BranchEntity, DoctorEntity, PatientEntity, doctor, visit};
use sea_orm::{ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};

use super::order_service::result_rows;
use crate::errors::{LabdeskError, Result};
use crate::storage::{OrderStatus, ResultFlag};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSnapshot {
    /// Lab name printed in the header when the snapshot was taken
    pub lab_name: String,
    pub patient_id: i64,
    pub patient_number: String,
    pub full_name: String,
    pub sex: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub age_years: Option<u32>,
    pub phone: String,
    pub visit_number: String,
    pub visited_at: DateTime<Utc>,
    pub referring_doctor: Option<String>,
    pub branch_code: String,
    pub branch_name: String,
    pub branch_address: Option<String>,
    pub branch_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLine {
    pub test_code: String,
    pub test_name: String,
    /// `None` while the order has no result (draft previews only)
    pub value: Option<String>,
    pub unit: Option<String>,
    pub ref_range: Option<String>,
    pub flag: Option<ResultFlag>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    pub lines: Vec<ResultLine>,
}

impl ResultsSnapshot {
    pub fn is_complete(&self) -> bool {
        self.lines.iter().all(|l| l.value.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSnapshot {
    pub doctor_id: i64,
    pub doctor_name: String,
    pub qualification: Option<String>,
    pub registration_no: Option<String>,
    pub signed_at: DateTime<Utc>,
}

impl SignatureSnapshot {
    pub fn of(doctor: &doctor::Model, signed_at: DateTime<Utc>) -> Self {
        Self {
            doctor_id: doctor.id,
            doctor_name: doctor.name.clone(),
            qualification: doctor.qualification.clone(),
            registration_no: doctor.registration_no.clone(),
            signed_at,
        }
    }
}

/// Everything a rendered report shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub report_number: String,
    pub version: i32,
    pub patient: PatientSnapshot,
    pub results: ResultsSnapshot,
    pub signature: Option<SignatureSnapshot>,
}

/// Whole years between two dates
pub fn age_in_years(date_of_birth: NaiveDate, on: NaiveDate) -> Option<u32> {
    let mut years = on.year() - date_of_birth.year();
    if (on.month(), on.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Human-readable reference range
pub fn format_ref_range(low: Option<f64>, high: Option<f64>) -> Option<String> {
    match (low, high) {
        (Some(low), Some(high)) => Some(format!("{} - {}", low, high)),
        (Some(low), None) => Some(format!(">= {}", low)),
        (None, Some(high)) => Some(format!("<= {}", high)),
        (None, None) => None,
    }
}

/// Read the patient header and result lines of a visit from live rows
pub async fn capture<C: ConnectionTrait>(
    conn: &C,
    visit: &visit::Model,
) -> Result<(PatientSnapshot, ResultsSnapshot)> {
    let patient = PatientEntity::find_by_id(visit.patient_id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Patient {} not found", visit.patient_id)))?;
    let branch = BranchEntity::find_by_id(visit.branch_id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Branch {} not found", visit.branch_id)))?;
    let referring_doctor = match visit.referring_doctor_id {
        Some(id) => DoctorEntity::find_by_id(id).one(conn).await?.map(|d| d.name),
        None => None,
    };

    let header = PatientSnapshot {
        lab_name: crate::config::get_config().reports.lab_name.clone(),
        patient_id: patient.id,
        patient_number: patient.patient_number,
        full_name: patient.full_name,
        sex: patient.sex,
        age_years: patient
            .date_of_birth
            .and_then(|dob| age_in_years(dob, visit.visited_at.date_naive())),
        date_of_birth: patient.date_of_birth,
        phone: patient.phone,
        visit_number: visit.visit_number.clone(),
        visited_at: visit.visited_at,
        referring_doctor,
        branch_code: branch.code,
        branch_name: branch.name,
        branch_address: branch.address,
        branch_phone: branch.phone,
    };

    let lines = result_rows(conn, visit.id)
        .await?
        .into_iter()
        .filter(|row| row.order_status != OrderStatus::Cancelled)
        .map(|row| {
            let (value, flag, remarks) = match row.result {
                Some(r) => (Some(r.value), Some(r.flag), r.remarks),
                None => (None, None, None),
            };
            ResultLine {
                test_code: row.test_code,
                test_name: row.test_name,
                value,
                unit: row.unit,
                ref_range: format_ref_range(row.ref_low, row.ref_high),
                flag,
                remarks,
            }
        })
        .collect();

    Ok((header, ResultsSnapshot { lines }))
}
