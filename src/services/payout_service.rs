//! Doctor payout ledgers
//!
//! A ledger is derived from bills: referral commission for REFERRAL doctors
//! on the diagnostics visits they sent, consultation share for CLINIC
//! doctors on the clinic visits they saw. Pending ledgers can be recomputed;
//! paid ones are frozen.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use csv::WriterBuilder;
use migration::entities::{
    BillEntity, DoctorEntity, DoctorPayoutLedgerEntity, VisitEntity, bill, doctor,
    doctor_payout_ledger, visit,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseBackend,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::visit_service::{day_after, day_start};
use super::{Paged, fetch_page};
use crate::errors::{LabdeskError, Result};
use crate::storage::{
    BillStatus, DoctorKind, LedgerStatus, PayoutBasis, SeaOrmStorage, VisitDomain,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ComputePayoutRequest {
    pub doctor_id: i64,
    pub period_start: NaiveDate,
    /// Inclusive
    pub period_end: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkPaidRequest {
    pub reference: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerFilter {
    pub doctor_id: Option<i64>,
    pub status: Option<LedgerStatus>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// One bill's contribution to a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLine {
    pub bill_id: i64,
    pub bill_number: String,
    pub visit_id: i64,
    pub visit_number: String,
    pub billed_at: DateTime<Utc>,
    pub net_amount: i64,
    pub rate_bp: i32,
    pub payout_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub id: i64,
    pub doctor_id: i64,
    pub basis: PayoutBasis,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub gross_amount: i64,
    pub payout_amount: i64,
    pub bill_count: i32,
    pub lines: Vec<PayoutLine>,
    pub status: LedgerStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerView {
    pub fn from_model(m: doctor_payout_ledger::Model) -> Result<Self> {
        Ok(Self {
            basis: PayoutBasis::parse(&m.basis)?,
            status: LedgerStatus::parse(&m.status)?,
            lines: serde_json::from_str(&m.lines)?,
            id: m.id,
            doctor_id: m.doctor_id,
            period_start: m.period_start,
            period_end: m.period_end,
            gross_amount: m.gross_amount,
            payout_amount: m.payout_amount,
            bill_count: m.bill_count,
            paid_at: m.paid_at,
            paid_reference: m.paid_reference,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

/// `net * bp / 10000`, rounded half-up in minor units
pub fn payout_for(net_amount: i64, rate_bp: i32) -> i64 {
    let scaled = i128::from(net_amount) * i128::from(rate_bp);
    ((scaled + 5_000) / 10_000) as i64
}

/// How a doctor kind earns
fn basis_for(kind: DoctorKind) -> Option<(PayoutBasis, VisitDomain)> {
    match kind {
        DoctorKind::Referral => Some((PayoutBasis::Referral, VisitDomain::Diagnostics)),
        DoctorKind::Clinic => Some((PayoutBasis::Clinic, VisitDomain::Clinic)),
        DoctorKind::Pathologist => None,
    }
}

fn overlaps(a_start: NaiveDate, a_end: NaiveDate, b_start: NaiveDate, b_end: NaiveDate) -> bool {
    a_start <= b_end && b_start <= a_end
}

const CSV_HEADER: [&str; 6] = [
    "bill_number",
    "visit_number",
    "billed_at",
    "net_amount",
    "rate_bp",
    "payout_amount",
];

#[derive(Serialize)]
struct CsvPayoutRow<'a> {
    bill_number: &'a str,
    visit_number: &'a str,
    billed_at: String,
    net_amount: i64,
    rate_bp: i32,
    payout_amount: i64,
}

/// Ledger lines as CSV with a header row
pub fn lines_to_csv(lines: &[PayoutLine]) -> Result<String> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(vec![]);
    // header even for an empty ledger
    writer.write_record(CSV_HEADER)?;
    for line in lines {
        writer.serialize(CsvPayoutRow {
            bill_number: &line.bill_number,
            visit_number: &line.visit_number,
            billed_at: line.billed_at.to_rfc3339(),
            net_amount: line.net_amount,
            rate_bp: line.rate_bp,
            payout_amount: line.payout_amount,
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| LabdeskError::serialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| LabdeskError::serialization(e.to_string()))
}

/// Load the doctor, holding its row until commit so computes for one doctor
/// run one after another. SQLite already has a single writer.
async fn lock_doctor(txn: &DatabaseTransaction, id: i64) -> Result<doctor::Model> {
    let mut query = DoctorEntity::find_by_id(id);
    if txn.get_database_backend() != DatabaseBackend::Sqlite {
        query = query.lock_exclusive();
    }
    query
        .one(txn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Doctor {} not found", id)))
}

async fn load_ledger<C: ConnectionTrait>(
    conn: &C,
    id: i64,
) -> Result<doctor_payout_ledger::Model> {
    DoctorPayoutLedgerEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Payout ledger {} not found", id)))
}

/// Bills behind a doctor's earnings in a period
async fn earning_lines<C: ConnectionTrait>(
    conn: &C,
    doctor_id: i64,
    domain: VisitDomain,
    basis: PayoutBasis,
    rate_bp: i32,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PayoutLine>> {
    let doctor_column = match basis {
        PayoutBasis::Referral => visit::Column::ReferringDoctorId,
        PayoutBasis::Clinic => visit::Column::ConsultingDoctorId,
    };
    let visits: HashMap<i64, String> = VisitEntity::find()
        .filter(doctor_column.eq(doctor_id))
        .filter(visit::Column::Domain.eq(domain.to_string()))
        .all(conn)
        .await?
        .into_iter()
        .map(|v| (v.id, v.visit_number))
        .collect();
    if visits.is_empty() {
        return Ok(Vec::new());
    }

    let bills = BillEntity::find()
        .filter(bill::Column::VisitId.is_in(visits.keys().copied()))
        .filter(bill::Column::Status.ne(BillStatus::Cancelled.to_string()))
        .filter(bill::Column::CreatedAt.gte(day_start(start)))
        .filter(bill::Column::CreatedAt.lt(day_after(end)?))
        .order_by_asc(bill::Column::CreatedAt)
        .order_by_asc(bill::Column::Id)
        .all(conn)
        .await?;

    Ok(bills
        .into_iter()
        .map(|b| PayoutLine {
            visit_number: visits.get(&b.visit_id).cloned().unwrap_or_default(),
            payout_amount: payout_for(b.net_amount, rate_bp),
            bill_id: b.id,
            bill_number: b.bill_number,
            visit_id: b.visit_id,
            billed_at: b.created_at,
            net_amount: b.net_amount,
            rate_bp,
        })
        .collect())
}

pub struct PayoutService {
    storage: Arc<SeaOrmStorage>,
}

impl PayoutService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// Build or rebuild the ledger of one doctor for one period
    pub async fn compute(&self, req: ComputePayoutRequest) -> Result<LedgerView> {
        if req.period_start > req.period_end {
            return Err(LabdeskError::validation(format!(
                "period_start {} is after period_end {}",
                req.period_start, req.period_end
            )));
        }

        let txn = self.storage.get_db().begin().await?;
        let doctor = lock_doctor(&txn, req.doctor_id).await?;
        let kind = DoctorKind::parse(&doctor.kind)?;
        let (basis, domain) = basis_for(kind).ok_or_else(|| {
            LabdeskError::validation(format!("{} doctors do not earn payouts", kind))
        })?;
        let rate_bp = match basis {
            PayoutBasis::Referral => doctor.commission_bp,
            PayoutBasis::Clinic => doctor.consultation_share_bp,
        };

        let existing = DoctorPayoutLedgerEntity::find()
            .filter(doctor_payout_ledger::Column::DoctorId.eq(doctor.id))
            .filter(doctor_payout_ledger::Column::Basis.eq(basis.to_string()))
            .all(&txn)
            .await?;
        let mut same_period = None;
        for ledger in existing {
            if !overlaps(
                ledger.period_start,
                ledger.period_end,
                req.period_start,
                req.period_end,
            ) {
                continue;
            }
            let status = LedgerStatus::parse(&ledger.status)?;
            if status == LedgerStatus::Paid {
                return Err(LabdeskError::ledger_paid(format!(
                    "Ledger {} ({} to {}) is paid and overlaps the requested period",
                    ledger.id, ledger.period_start, ledger.period_end
                )));
            }
            if ledger.period_start == req.period_start && ledger.period_end == req.period_end {
                same_period = Some(ledger);
            }
        }

        let lines = earning_lines(
            &txn,
            doctor.id,
            domain,
            basis,
            rate_bp,
            req.period_start,
            req.period_end,
        )
        .await?;
        let gross: i64 = lines.iter().map(|l| l.net_amount).sum();
        let payout: i64 = lines.iter().map(|l| l.payout_amount).sum();
        let bill_count = i32::try_from(lines.len())
            .map_err(|_| LabdeskError::validation("too many bills in one ledger"))?;
        let lines_json = serde_json::to_string(&lines)?;
        let now = Utc::now();

        let model = match same_period {
            Some(ledger) => {
                debug!("Recomputing pending ledger {}", ledger.id);
                let result = DoctorPayoutLedgerEntity::update_many()
                    .col_expr(doctor_payout_ledger::Column::GrossAmount, Expr::value(gross))
                    .col_expr(doctor_payout_ledger::Column::PayoutAmount, Expr::value(payout))
                    .col_expr(doctor_payout_ledger::Column::BillCount, Expr::value(bill_count))
                    .col_expr(doctor_payout_ledger::Column::Lines, Expr::value(lines_json))
                    .col_expr(doctor_payout_ledger::Column::UpdatedAt, Expr::value(now))
                    .filter(doctor_payout_ledger::Column::Id.eq(ledger.id))
                    .filter(
                        doctor_payout_ledger::Column::Status.eq(LedgerStatus::Pending.to_string()),
                    )
                    .exec(&txn)
                    .await?;
                if result.rows_affected == 0 {
                    return Err(LabdeskError::ledger_paid(format!(
                        "Ledger {} was paid while it was being recomputed",
                        ledger.id
                    )));
                }
                load_ledger(&txn, ledger.id).await?
            }
            None => {
                doctor_payout_ledger::ActiveModel {
                    doctor_id: Set(doctor.id),
                    basis: Set(basis.to_string()),
                    period_start: Set(req.period_start),
                    period_end: Set(req.period_end),
                    gross_amount: Set(gross),
                    payout_amount: Set(payout),
                    bill_count: Set(bill_count),
                    lines: Set(lines_json),
                    status: Set(LedgerStatus::Pending.to_string()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };
        txn.commit().await?;

        info!(
            "Payout ledger {} for doctor {} ({}): {} bills, gross {}, payout {}",
            model.id, doctor.id, basis, bill_count, gross, payout
        );
        LedgerView::from_model(model)
    }

    pub async fn mark_paid(&self, id: i64, reference: &str) -> Result<LedgerView> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(LabdeskError::validation("payment reference must not be empty"));
        }
        let txn = self.storage.get_db().begin().await?;
        let ledger = load_ledger(&txn, id).await?;
        if LedgerStatus::parse(&ledger.status)? == LedgerStatus::Paid {
            return Err(LabdeskError::ledger_paid(format!(
                "Ledger {} is already paid",
                id
            )));
        }

        let now = Utc::now();
        let result = DoctorPayoutLedgerEntity::update_many()
            .col_expr(
                doctor_payout_ledger::Column::Status,
                Expr::value(LedgerStatus::Paid.to_string()),
            )
            .col_expr(doctor_payout_ledger::Column::PaidAt, Expr::value(now))
            .col_expr(
                doctor_payout_ledger::Column::PaidReference,
                Expr::value(reference.to_string()),
            )
            .col_expr(doctor_payout_ledger::Column::UpdatedAt, Expr::value(now))
            .filter(doctor_payout_ledger::Column::Id.eq(id))
            .filter(doctor_payout_ledger::Column::Status.eq(LedgerStatus::Pending.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(LabdeskError::ledger_paid(format!(
                "Ledger {} was paid concurrently",
                id
            )));
        }
        let model = load_ledger(&txn, id).await?;
        txn.commit().await?;

        info!("Payout ledger {} marked paid ({})", id, reference);
        LedgerView::from_model(model)
    }

    pub async fn get_ledger(&self, id: i64) -> Result<LedgerView> {
        LedgerView::from_model(load_ledger(self.storage.get_db(), id).await?)
    }

    pub async fn list_ledgers(&self, filter: LedgerFilter) -> Result<Paged<LedgerView>> {
        let mut select = DoctorPayoutLedgerEntity::find()
            .order_by_desc(doctor_payout_ledger::Column::PeriodStart)
            .order_by_desc(doctor_payout_ledger::Column::Id);
        if let Some(doctor_id) = filter.doctor_id {
            select = select.filter(doctor_payout_ledger::Column::DoctorId.eq(doctor_id));
        }
        if let Some(status) = filter.status {
            select = select.filter(doctor_payout_ledger::Column::Status.eq(status.to_string()));
        }
        let Paged {
            items,
            total,
            page,
            page_size,
        } = fetch_page(select, self.storage.get_db(), filter.page, filter.page_size).await?;
        let items = items
            .into_iter()
            .map(LedgerView::from_model)
            .collect::<Result<Vec<_>>>()?;
        Ok(Paged {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Only pending ledgers can be deleted
    pub async fn delete_ledger(&self, id: i64) -> Result<()> {
        let txn = self.storage.get_db().begin().await?;
        let ledger = load_ledger(&txn, id).await?;
        if LedgerStatus::parse(&ledger.status)? == LedgerStatus::Paid {
            return Err(LabdeskError::ledger_paid(format!(
                "Ledger {} is paid and cannot be deleted",
                id
            )));
        }
        let result = DoctorPayoutLedgerEntity::delete_many()
            .filter(doctor_payout_ledger::Column::Id.eq(id))
            .filter(doctor_payout_ledger::Column::Status.eq(LedgerStatus::Pending.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(LabdeskError::ledger_paid(format!(
                "Ledger {} was paid concurrently",
                id
            )));
        }
        txn.commit().await?;
        info!("Payout ledger {} deleted", id);
        Ok(())
    }

    pub async fn export_csv(&self, id: i64) -> Result<String> {
        let ledger = self.get_ledger(id).await?;
        lines_to_csv(&ledger.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_payout_for_rounds_half_up() {
        assert_eq!(payout_for(10_000, 1_000), 1_000);
        // 1234 * 0.15 = 185.1
        assert_eq!(payout_for(1_234, 1_500), 185);
        // 1 * 0.5 = 0.5 rounds up
        assert_eq!(payout_for(1, 5_000), 1);
        // 1 * 0.4999 rounds down
        assert_eq!(payout_for(1, 4_999), 0);
        assert_eq!(payout_for(0, 2_500), 0);
    }

    #[test]
    fn test_payout_for_large_amounts_do_not_overflow() {
        assert_eq!(payout_for(i64::MAX / 2, 10_000), i64::MAX / 2);
    }

    #[test]
    fn test_overlaps() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 1, day).unwrap();
        assert!(overlaps(d(1), d(10), d(10), d(20)));
        assert!(overlaps(d(5), d(6), d(1), d(31)));
        assert!(!overlaps(d(1), d(9), d(10), d(20)));
    }

    #[test]
    fn test_basis_for_kind() {
        assert_eq!(
            basis_for(DoctorKind::Referral),
            Some((PayoutBasis::Referral, VisitDomain::Diagnostics))
        );
        assert_eq!(
            basis_for(DoctorKind::Clinic),
            Some((PayoutBasis::Clinic, VisitDomain::Clinic))
        );
        assert_eq!(basis_for(DoctorKind::Pathologist), None);
    }

    #[test]
    fn test_lines_to_csv() {
        let lines = vec![PayoutLine {
            bill_id: 1,
            bill_number: "BIL-MAIN-2026-000001".into(),
            visit_id: 2,
            visit_number: "VIS-MAIN-2026-000001".into(),
            billed_at: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
            net_amount: 50_000,
            rate_bp: 1_000,
            payout_amount: 5_000,
        }];
        let csv = lines_to_csv(&lines).unwrap();
        let mut rows = csv.lines();
        assert_eq!(
            rows.next(),
            Some("bill_number,visit_number,billed_at,net_amount,rate_bp,payout_amount")
        );
        assert_eq!(
            rows.next(),
            Some("BIL-MAIN-2026-000001,VIS-MAIN-2026-000001,2026-01-05T10:00:00+00:00,50000,1000,5000")
        );
        assert_eq!(rows.next(), None);

        let empty = lines_to_csv(&[]).unwrap();
        assert_eq!(empty.trim_end(), CSV_HEADER.join(","));
    }
}
