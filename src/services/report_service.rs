//! Report versions: draft, finalize, amend, render
//!
//! A version is mutable only while DRAFT. Finalization freezes the patient
//! header, the results and the signature into snapshot columns; from then
//! on the version renders from those columns alone. Corrections create a new
//! DRAFT version under the same report number.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use migration::entities::{ReportVersionEntity, report_version};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::catalog_service::{load_branch, load_doctor};
use super::numbering::{NumberGenerator, NumberKind};
use super::render::render_report_html;
use super::snapshot::{
    PatientSnapshot, ReportSnapshot, ResultsSnapshot, SignatureSnapshot, capture,
};
use super::visit_service::{load_active_visit, load_visit};
use crate::errors::{LabdeskError, Result};
use crate::storage::{DoctorKind, KeyedLocks, ReportStatus, SeaOrmStorage};

#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeReportRequest {
    pub signed_by_doctor_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub id: i64,
    pub report_number: String,
    pub visit_id: i64,
    pub version: i32,
    pub status: ReportStatus,
    pub signed_by_doctor_id: Option<i64>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Frozen content, present once finalized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ReportSnapshot>,
}

impl ReportView {
    pub fn from_model(m: report_version::Model) -> Result<Self> {
        let status = ReportStatus::parse(&m.status)?;
        let snapshot = match status {
            ReportStatus::Finalized => Some(stored_snapshot(&m)?),
            ReportStatus::Draft => None,
        };
        Ok(Self {
            id: m.id,
            report_number: m.report_number,
            visit_id: m.visit_id,
            version: m.version,
            status,
            signed_by_doctor_id: m.signed_by_doctor_id,
            finalized_at: m.finalized_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
            snapshot,
        })
    }
}

fn snapshot_column<T: serde::de::DeserializeOwned>(
    column: Option<&str>,
    name: &str,
    id: i64,
) -> Result<T> {
    let raw = column.ok_or_else(|| {
        LabdeskError::database_operation(format!(
            "Finalized report version {} has no {}",
            id, name
        ))
    })?;
    Ok(serde_json::from_str(raw)?)
}

/// Rebuild the frozen snapshot of a finalized version
pub fn stored_snapshot(m: &report_version::Model) -> Result<ReportSnapshot> {
    let patient: PatientSnapshot =
        snapshot_column(m.patient_snapshot.as_deref(), "patient_snapshot", m.id)?;
    let results: ResultsSnapshot =
        snapshot_column(m.results_snapshot.as_deref(), "results_snapshot", m.id)?;
    let signature: SignatureSnapshot =
        snapshot_column(m.signature_snapshot.as_deref(), "signature_snapshot", m.id)?;
    Ok(ReportSnapshot {
        report_number: m.report_number.clone(),
        version: m.version,
        patient,
        results,
        signature: Some(signature),
    })
}

async fn load_version<C: ConnectionTrait>(conn: &C, id: i64) -> Result<report_version::Model> {
    ReportVersionEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Report version {} not found", id)))
}

async fn latest_for_visit<C: ConnectionTrait>(
    conn: &C,
    visit_id: i64,
) -> Result<Option<report_version::Model>> {
    Ok(ReportVersionEntity::find()
        .filter(report_version::Column::VisitId.eq(visit_id))
        .order_by_desc(report_version::Column::Version)
        .one(conn)
        .await?)
}

pub struct ReportService {
    storage: Arc<SeaOrmStorage>,
    numbers: NumberGenerator,
    /// Serializes draft creation per visit
    drafts: KeyedLocks,
}

impl ReportService {
    pub fn new(storage: Arc<SeaOrmStorage>, numbers: NumberGenerator) -> Self {
        Self {
            storage,
            numbers,
            drafts: KeyedLocks::new(),
        }
    }

    /// Open the first version of a visit's report, or return the open draft
    pub async fn create_draft(&self, visit_id: i64) -> Result<ReportView> {
        let _guard = self.drafts.lock(visit_id).await;
        let txn = self.storage.get_db().begin().await?;
        let visit = load_active_visit(&txn, visit_id).await?;

        if let Some(latest) = latest_for_visit(&txn, visit_id).await? {
            return match ReportStatus::parse(&latest.status)? {
                ReportStatus::Draft => ReportView::from_model(latest),
                ReportStatus::Finalized => Err(LabdeskError::report_finalized(format!(
                    "Report {} v{} is finalized; amend it to make changes",
                    latest.report_number, latest.version
                ))),
            };
        }

        let branch = load_branch(&txn, visit.branch_id).await?;
        let report_number = self
            .numbers
            .next(&txn, NumberKind::Report, &branch.code)
            .await?;
        let now = Utc::now();
        let model = report_version::ActiveModel {
            report_number: Set(report_number),
            visit_id: Set(visit.id),
            version: Set(1),
            status: Set(ReportStatus::Draft.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(
            "Report draft created: {} v1 for visit {}",
            model.report_number, visit.visit_number
        );
        ReportView::from_model(model)
    }

    /// Freeze and sign a draft
    pub async fn finalize(&self, report_id: i64, signed_by_doctor_id: i64) -> Result<ReportView> {
        let txn = self.storage.get_db().begin().await?;
        let version = load_version(&txn, report_id).await?;
        if ReportStatus::parse(&version.status)? != ReportStatus::Draft {
            return Err(LabdeskError::report_finalized(format!(
                "Report {} v{} is already finalized",
                version.report_number, version.version
            )));
        }

        let signer = load_doctor(&txn, signed_by_doctor_id).await?;
        if DoctorKind::parse(&signer.kind)? != DoctorKind::Pathologist || !signer.active {
            return Err(LabdeskError::validation(format!(
                "Reports must be signed by an active PATHOLOGIST, {} is not",
                signer.name
            )));
        }

        let visit = load_visit(&txn, version.visit_id).await?;
        let (patient, results) = capture(&txn, &visit).await?;
        if results.lines.is_empty() {
            return Err(LabdeskError::report_incomplete(format!(
                "Visit {} has no active test orders",
                visit.visit_number
            )));
        }
        if !results.is_complete() {
            let pending: Vec<&str> = results
                .lines
                .iter()
                .filter(|l| l.value.is_none())
                .map(|l| l.test_code.as_str())
                .collect();
            return Err(LabdeskError::report_incomplete(format!(
                "Results pending for: {}",
                pending.join(", ")
            )));
        }

        let now = Utc::now();
        let signature = SignatureSnapshot::of(&signer, now);
        let result = ReportVersionEntity::update_many()
            .col_expr(
                report_version::Column::PatientSnapshot,
                Expr::value(serde_json::to_string(&patient)?),
            )
            .col_expr(
                report_version::Column::ResultsSnapshot,
                Expr::value(serde_json::to_string(&results)?),
            )
            .col_expr(
                report_version::Column::SignatureSnapshot,
                Expr::value(serde_json::to_string(&signature)?),
            )
            .col_expr(
                report_version::Column::Status,
                Expr::value(ReportStatus::Finalized.to_string()),
            )
            .col_expr(report_version::Column::SignedByDoctorId, Expr::value(signer.id))
            .col_expr(report_version::Column::FinalizedAt, Expr::value(now))
            .col_expr(report_version::Column::UpdatedAt, Expr::value(now))
            .filter(report_version::Column::Id.eq(report_id))
            .filter(report_version::Column::Status.eq(ReportStatus::Draft.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            warn!("Concurrent finalize lost on report version {}", report_id);
            return Err(LabdeskError::report_finalized(format!(
                "Report {} v{} was finalized concurrently",
                version.report_number, version.version
            )));
        }

        let model = load_version(&txn, report_id).await?;
        txn.commit().await?;
        info!(
            "Report finalized: {} v{} signed by {}",
            model.report_number, model.version, signer.name
        );
        ReportView::from_model(model)
    }

    /// Start version n+1 from the latest finalized version
    pub async fn amend(&self, report_id: i64) -> Result<ReportView> {
        let txn = self.storage.get_db().begin().await?;
        let version = load_version(&txn, report_id).await?;
        if ReportStatus::parse(&version.status)? != ReportStatus::Finalized {
            return Err(LabdeskError::conflict(format!(
                "Report {} v{} is still a draft; edit it instead of amending",
                version.report_number, version.version
            )));
        }

        let latest = ReportVersionEntity::find()
            .filter(report_version::Column::ReportNumber.eq(&version.report_number))
            .order_by_desc(report_version::Column::Version)
            .one(&txn)
            .await?;
        if let Some(latest) = latest
            && latest.version != version.version
        {
            return Err(LabdeskError::conflict(format!(
                "Report {} already has version {}",
                version.report_number, latest.version
            )));
        }

        let now = Utc::now();
        let model = report_version::ActiveModel {
            report_number: Set(version.report_number.clone()),
            visit_id: Set(version.visit_id),
            version: Set(version.version + 1),
            status: Set(ReportStatus::Draft.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(
            "Report amended: {} v{} opened from v{}",
            model.report_number, model.version, version.version
        );
        ReportView::from_model(model)
    }

    /// Finalized versions render from their snapshot; drafts from live rows
    pub async fn render_html(&self, report_id: i64) -> Result<String> {
        let db = self.storage.get_db();
        let version = load_version(db, report_id).await?;
        let status = ReportStatus::parse(&version.status)?;
        let snapshot = match status {
            ReportStatus::Finalized => stored_snapshot(&version)?,
            ReportStatus::Draft => {
                let visit = load_visit(db, version.visit_id).await?;
                let (patient, results) = capture(db, &visit).await?;
                ReportSnapshot {
                    report_number: version.report_number.clone(),
                    version: version.version,
                    patient,
                    results,
                    signature: None,
                }
            }
        };
        Ok(render_report_html(&snapshot, status))
    }

    pub async fn get_report(&self, id: i64) -> Result<ReportView> {
        ReportView::from_model(load_version(self.storage.get_db(), id).await?)
    }

    pub async fn list_versions(&self, visit_id: i64) -> Result<Vec<ReportView>> {
        let db = self.storage.get_db();
        load_visit(db, visit_id).await?;
        ReportVersionEntity::find()
            .filter(report_version::Column::VisitId.eq(visit_id))
            .order_by_asc(report_version::Column::Version)
            .all(db)
            .await?
            .into_iter()
            .map(ReportView::from_model)
            .collect()
    }

    /// Drop a draft; finalized versions are permanent
    pub async fn delete_report(&self, id: i64) -> Result<()> {
        let txn = self.storage.get_db().begin().await?;
        let version = load_version(&txn, id).await?;
        if ReportStatus::parse(&version.status)? == ReportStatus::Finalized {
            return Err(LabdeskError::report_finalized(format!(
                "Report {} v{} is finalized and cannot be deleted",
                version.report_number, version.version
            )));
        }
        let result = ReportVersionEntity::delete_many()
            .filter(report_version::Column::Id.eq(id))
            .filter(report_version::Column::Status.eq(ReportStatus::Draft.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(LabdeskError::report_finalized(format!(
                "Report {} v{} was finalized concurrently",
                version.report_number, version.version
            )));
        }
        txn.commit().await?;
        info!(
            "Report draft deleted: {} v{}",
            version.report_number, version.version
        );
        Ok(())
    }
}
