//! Visits: one billable encounter in the lab or the clinic

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use migration::entities::{PatientEntity, VisitEntity, visit};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::catalog_service::{load_branch, load_doctor};
use super::numbering::{NumberGenerator, NumberKind};
use super::order_service::{OrderView, insert_orders, orders_of};
use super::{Paged, fetch_page};
use crate::errors::{LabdeskError, Result};
use crate::storage::{DoctorKind, SeaOrmStorage, VisitDomain, VisitStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVisitRequest {
    pub branch_id: i64,
    pub patient_id: i64,
    pub domain: VisitDomain,
    pub referring_doctor_id: Option<i64>,
    pub consulting_doctor_id: Option<i64>,
    pub notes: Option<String>,
    /// Defaults to now
    pub visited_at: Option<DateTime<Utc>>,
    /// Lab tests to order right away
    #[serde(default)]
    pub test_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitFilter {
    pub patient_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub domain: Option<VisitDomain>,
    pub status: Option<VisitStatus>,
    /// Inclusive calendar dates on `visited_at`
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitView {
    pub id: i64,
    pub visit_number: String,
    pub branch_id: i64,
    pub patient_id: i64,
    pub domain: VisitDomain,
    pub referring_doctor_id: Option<i64>,
    pub consulting_doctor_id: Option<i64>,
    pub status: VisitStatus,
    pub notes: Option<String>,
    pub visited_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<Vec<OrderView>>,
}

impl VisitView {
    pub fn from_model(m: visit::Model) -> Result<Self> {
        Ok(Self {
            domain: VisitDomain::parse(&m.domain)?,
            status: VisitStatus::parse(&m.status)?,
            id: m.id,
            visit_number: m.visit_number,
            branch_id: m.branch_id,
            patient_id: m.patient_id,
            referring_doctor_id: m.referring_doctor_id,
            consulting_doctor_id: m.consulting_doctor_id,
            notes: m.notes,
            visited_at: m.visited_at,
            updated_at: m.updated_at,
            orders: None,
        })
    }
}

pub(crate) async fn load_visit<C: ConnectionTrait>(conn: &C, id: i64) -> Result<visit::Model> {
    VisitEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Visit {} not found", id)))
}

/// Load a visit that may still take orders and bills
pub(crate) async fn load_active_visit<C: ConnectionTrait>(
    conn: &C,
    id: i64,
) -> Result<visit::Model> {
    let visit = load_visit(conn, id).await?;
    if VisitStatus::parse(&visit.status)? == VisitStatus::Cancelled {
        return Err(LabdeskError::validation(format!(
            "Visit {} is cancelled",
            visit.visit_number
        )));
    }
    Ok(visit)
}

/// Doctor must exist, be active and be of `kind`
async fn check_doctor<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    kind: DoctorKind,
    role: &str,
) -> Result<()> {
    let doctor = load_doctor(conn, id).await?;
    if DoctorKind::parse(&doctor.kind)? != kind {
        return Err(LabdeskError::validation(format!(
            "{} doctor must be a {} doctor, {} is {}",
            role, kind, doctor.name, doctor.kind
        )));
    }
    if !doctor.active {
        return Err(LabdeskError::validation(format!(
            "Doctor {} is inactive",
            doctor.name
        )));
    }
    Ok(())
}

pub struct VisitService {
    storage: Arc<SeaOrmStorage>,
    numbers: NumberGenerator,
}

impl VisitService {
    pub fn new(storage: Arc<SeaOrmStorage>, numbers: NumberGenerator) -> Self {
        Self { storage, numbers }
    }

    pub async fn create_visit(&self, req: CreateVisitRequest) -> Result<VisitView> {
        let txn = self.storage.get_db().begin().await?;

        let branch = load_branch(&txn, req.branch_id).await?;
        if !branch.active {
            return Err(LabdeskError::validation(format!(
                "Branch {} is inactive",
                branch.code
            )));
        }
        PatientEntity::find_by_id(req.patient_id)
            .one(&txn)
            .await?
            .ok_or_else(|| LabdeskError::not_found(format!("Patient {} not found", req.patient_id)))?;

        if let Some(id) = req.referring_doctor_id {
            check_doctor(&txn, id, DoctorKind::Referral, "Referring").await?;
        }
        match (req.domain, req.consulting_doctor_id) {
            (VisitDomain::Clinic, Some(id)) => {
                check_doctor(&txn, id, DoctorKind::Clinic, "Consulting").await?
            }
            (VisitDomain::Clinic, None) => {
                return Err(LabdeskError::validation(
                    "A CLINIC visit needs a consulting doctor",
                ));
            }
            (VisitDomain::Diagnostics, Some(_)) => {
                return Err(LabdeskError::validation(
                    "Only CLINIC visits take a consulting doctor",
                ));
            }
            (VisitDomain::Diagnostics, None) => {}
        }

        let visit_number = self
            .numbers
            .next(&txn, NumberKind::Visit, &branch.code)
            .await?;
        let now = Utc::now();
        let model = visit::ActiveModel {
            visit_number: Set(visit_number),
            branch_id: Set(branch.id),
            patient_id: Set(req.patient_id),
            domain: Set(req.domain.to_string()),
            referring_doctor_id: Set(req.referring_doctor_id),
            consulting_doctor_id: Set(req.consulting_doctor_id),
            status: Set(VisitStatus::Open.to_string()),
            notes: Set(req.notes),
            visited_at: Set(req.visited_at.unwrap_or(now)),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let orders = if req.test_ids.is_empty() {
            Vec::new()
        } else {
            insert_orders(&txn, model.id, &req.test_ids).await?
        };

        txn.commit().await?;
        info!(
            "Visit created: {} ({} orders)",
            model.visit_number,
            orders.len()
        );

        let mut view = VisitView::from_model(model)?;
        view.orders = Some(orders);
        Ok(view)
    }

    pub async fn get_visit(&self, id: i64) -> Result<VisitView> {
        let db = self.storage.get_db();
        let model = load_visit(db, id).await?;
        let orders = orders_of(db, id).await?;
        let mut view = VisitView::from_model(model)?;
        view.orders = Some(orders);
        Ok(view)
    }

    pub async fn list_visits(&self, filter: VisitFilter) -> Result<Paged<VisitView>> {
        let mut select = VisitEntity::find().order_by_desc(visit::Column::VisitedAt);
        if let Some(patient_id) = filter.patient_id {
            select = select.filter(visit::Column::PatientId.eq(patient_id));
        }
        if let Some(branch_id) = filter.branch_id {
            select = select.filter(visit::Column::BranchId.eq(branch_id));
        }
        if let Some(domain) = filter.domain {
            select = select.filter(visit::Column::Domain.eq(domain.to_string()));
        }
        if let Some(status) = filter.status {
            select = select.filter(visit::Column::Status.eq(status.to_string()));
        }
        if let Some(from) = filter.from {
            select = select.filter(visit::Column::VisitedAt.gte(day_start(from)));
        }
        if let Some(to) = filter.to {
            select = select.filter(visit::Column::VisitedAt.lt(day_after(to)?));
        }

        let page = fetch_page(select, self.storage.get_db(), filter.page, filter.page_size).await?;
        let Paged {
            items,
            total,
            page,
            page_size,
        } = page;
        let items = items
            .into_iter()
            .map(VisitView::from_model)
            .collect::<Result<Vec<_>>>()?;
        Ok(Paged {
            items,
            total,
            page,
            page_size,
        })
    }

    /// OPEN moves to COMPLETED or CANCELLED; both are terminal
    pub async fn update_status(&self, id: i64, status: VisitStatus) -> Result<VisitView> {
        if status == VisitStatus::Open {
            return Err(LabdeskError::validation("A visit cannot be reopened"));
        }
        let txn = self.storage.get_db().begin().await?;
        let current = load_visit(&txn, id).await?;
        let current_status = VisitStatus::parse(&current.status)?;
        if current_status != VisitStatus::Open {
            return Err(LabdeskError::conflict(format!(
                "Visit {} is already {}",
                current.visit_number, current_status
            )));
        }

        let result = VisitEntity::update_many()
            .col_expr(visit::Column::Status, Expr::value(status.to_string()))
            .col_expr(visit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(visit::Column::Id.eq(id))
            .filter(visit::Column::Status.eq(VisitStatus::Open.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(LabdeskError::conflict(format!(
                "Visit {} changed status concurrently",
                current.visit_number
            )));
        }
        let model = load_visit(&txn, id).await?;
        txn.commit().await?;

        info!("Visit {} is now {}", model.visit_number, status);
        VisitView::from_model(model)
    }
}

/// Midnight UTC at the start of `date`
pub(crate) fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Midnight UTC after `date`, the exclusive upper bound of an inclusive range
pub(crate) fn day_after(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.succ_opt()
        .map(day_start)
        .ok_or_else(|| LabdeskError::validation(format!("Date {} is out of range", date)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        assert_eq!(day_start(date).to_rfc3339(), "2026-02-28T00:00:00+00:00");
        assert_eq!(
            day_after(date).unwrap().to_rfc3339(),
            "2026-03-01T00:00:00+00:00"
        );
        assert!(day_after(NaiveDate::MAX).is_err());
    }

    #[test]
    fn test_create_request_parses_domain() {
        let req: CreateVisitRequest = serde_json::from_str(
            r#"{"branch_id": 1, "patient_id": 2, "domain": "CLINIC", "consulting_doctor_id": 3}"#,
        )
        .unwrap();
        assert_eq!(req.domain, VisitDomain::Clinic);
        assert!(req.test_ids.is_empty());
    }
}
