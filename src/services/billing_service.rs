//! Bills and payments
//!
//! Amounts are integer minor units. Payments update `paid_amount` with a
//! compare-and-set so two cashiers cannot both settle the same balance.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use migration::entities::{BillEntity, BillItemEntity, LabTestEntity, bill, bill_item};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::catalog_service::load_branch;
use super::numbering::{NumberGenerator, NumberKind};
use super::visit_service::{day_after, day_start, load_active_visit};
use super::{Paged, fetch_page};
use crate::errors::{LabdeskError, Result};
use crate::storage::{BillStatus, SeaOrmStorage};

#[derive(Debug, Clone, Deserialize)]
pub struct BillItemInput {
    /// Catalog test; description and amount default from it
    pub lab_test_id: Option<i64>,
    pub description: Option<String>,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBillRequest {
    pub visit_id: i64,
    pub items: Vec<BillItemInput>,
    #[serde(default)]
    pub discount_amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillFilter {
    pub visit_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub status: Option<BillStatus>,
    /// Inclusive calendar dates on `created_at`
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillItemView {
    pub id: i64,
    pub lab_test_id: Option<i64>,
    pub description: String,
    pub amount: i64,
}

impl From<bill_item::Model> for BillItemView {
    fn from(m: bill_item::Model) -> Self {
        Self {
            id: m.id,
            lab_test_id: m.lab_test_id,
            description: m.description,
            amount: m.amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BillView {
    pub id: i64,
    pub bill_number: String,
    pub visit_id: i64,
    pub branch_id: i64,
    pub gross_amount: i64,
    pub discount_amount: i64,
    pub net_amount: i64,
    pub paid_amount: i64,
    pub balance: i64,
    pub status: BillStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<BillItemView>>,
}

impl BillView {
    pub fn from_model(m: bill::Model) -> Result<Self> {
        Ok(Self {
            status: BillStatus::parse(&m.status)?,
            balance: m.net_amount - m.paid_amount,
            id: m.id,
            bill_number: m.bill_number,
            visit_id: m.visit_id,
            branch_id: m.branch_id,
            gross_amount: m.gross_amount,
            discount_amount: m.discount_amount,
            net_amount: m.net_amount,
            paid_amount: m.paid_amount,
            created_at: m.created_at,
            updated_at: m.updated_at,
            items: None,
        })
    }
}

/// Resolved line before insert
struct PricedItem {
    lab_test_id: Option<i64>,
    description: String,
    amount: i64,
}

/// Gross total, rejecting negative lines and overflow
fn total_of(amounts: impl IntoIterator<Item = i64>) -> Result<i64> {
    amounts.into_iter().try_fold(0i64, |acc, amount| {
        if amount < 0 {
            return Err(LabdeskError::validation("item amount must not be negative"));
        }
        acc.checked_add(amount)
            .ok_or_else(|| LabdeskError::validation("bill total is too large"))
    })
}

fn check_discount(discount: i64, gross: i64) -> Result<()> {
    if discount < 0 || discount > gross {
        return Err(LabdeskError::validation(format!(
            "discount must be between 0 and the gross amount {}, got {}",
            gross, discount
        )));
    }
    Ok(())
}

async fn load_bill<C: ConnectionTrait>(conn: &C, id: i64) -> Result<bill::Model> {
    BillEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Bill {} not found", id)))
}

pub struct BillingService {
    storage: Arc<SeaOrmStorage>,
    numbers: NumberGenerator,
}

impl BillingService {
    pub fn new(storage: Arc<SeaOrmStorage>, numbers: NumberGenerator) -> Self {
        Self { storage, numbers }
    }

    pub async fn create_bill(&self, req: CreateBillRequest) -> Result<BillView> {
        if req.items.is_empty() {
            return Err(LabdeskError::validation("a bill needs at least one item"));
        }

        let txn = self.storage.get_db().begin().await?;
        let visit = load_active_visit(&txn, req.visit_id).await?;
        let branch = load_branch(&txn, visit.branch_id).await?;

        let mut priced = Vec::with_capacity(req.items.len());
        for item in req.items {
            let resolved = match item.lab_test_id {
                Some(test_id) => {
                    let test = LabTestEntity::find_by_id(test_id)
                        .one(&txn)
                        .await?
                        .ok_or_else(|| {
                            LabdeskError::not_found(format!("Lab test {} not found", test_id))
                        })?;
                    PricedItem {
                        lab_test_id: Some(test.id),
                        description: item
                            .description
                            .filter(|d| !d.trim().is_empty())
                            .unwrap_or(test.name),
                        amount: item.amount.unwrap_or(test.price),
                    }
                }
                None => {
                    let description = item
                        .description
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty())
                        .ok_or_else(|| {
                            LabdeskError::validation("free items need a description")
                        })?;
                    let amount = item
                        .amount
                        .ok_or_else(|| LabdeskError::validation("free items need an amount"))?;
                    PricedItem {
                        lab_test_id: None,
                        description,
                        amount,
                    }
                }
            };
            priced.push(resolved);
        }

        let gross = total_of(priced.iter().map(|p| p.amount))?;
        check_discount(req.discount_amount, gross)?;
        let net = gross - req.discount_amount;

        let bill_number = self
            .numbers
            .next(&txn, NumberKind::Bill, &branch.code)
            .await?;
        let now = Utc::now();
        let model = bill::ActiveModel {
            bill_number: Set(bill_number),
            visit_id: Set(visit.id),
            branch_id: Set(branch.id),
            gross_amount: Set(gross),
            discount_amount: Set(req.discount_amount),
            net_amount: Set(net),
            paid_amount: Set(0),
            status: Set(BillStatus::for_amounts(0, net).to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for p in priced {
            let item = bill_item::ActiveModel {
                bill_id: Set(model.id),
                lab_test_id: Set(p.lab_test_id),
                description: Set(p.description),
                amount: Set(p.amount),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            items.push(item.into());
        }
        txn.commit().await?;

        info!(
            "Bill created: {} (gross {}, discount {}, net {})",
            model.bill_number, gross, req.discount_amount, net
        );
        let mut view = BillView::from_model(model)?;
        view.items = Some(items);
        Ok(view)
    }

    pub async fn record_payment(&self, bill_id: i64, amount: i64) -> Result<BillView> {
        if amount <= 0 {
            return Err(LabdeskError::validation("payment amount must be positive"));
        }
        let txn = self.storage.get_db().begin().await?;
        let current = load_bill(&txn, bill_id).await?;
        match BillStatus::parse(&current.status)? {
            BillStatus::Cancelled => {
                return Err(LabdeskError::conflict(format!(
                    "Bill {} is cancelled",
                    current.bill_number
                )));
            }
            BillStatus::Paid => {
                return Err(LabdeskError::conflict(format!(
                    "Bill {} is already paid",
                    current.bill_number
                )));
            }
            BillStatus::Unpaid | BillStatus::Partial => {}
        }

        let paid = current
            .paid_amount
            .checked_add(amount)
            .filter(|p| *p <= current.net_amount)
            .ok_or_else(|| {
                LabdeskError::validation(format!(
                    "payment of {} exceeds the outstanding balance {}",
                    amount,
                    current.net_amount - current.paid_amount
                ))
            })?;
        let status = BillStatus::for_amounts(paid, current.net_amount);

        let result = BillEntity::update_many()
            .col_expr(bill::Column::PaidAmount, Expr::value(paid))
            .col_expr(bill::Column::Status, Expr::value(status.to_string()))
            .col_expr(bill::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(bill::Column::Id.eq(bill_id))
            .filter(bill::Column::PaidAmount.eq(current.paid_amount))
            .filter(bill::Column::Status.ne(BillStatus::Cancelled.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(LabdeskError::conflict(format!(
                "Bill {} changed while recording the payment, retry",
                current.bill_number
            )));
        }
        let model = load_bill(&txn, bill_id).await?;
        txn.commit().await?;

        info!(
            "Payment of {} recorded on {} ({} of {}, {})",
            amount, model.bill_number, model.paid_amount, model.net_amount, status
        );
        BillView::from_model(model)
    }

    /// Only bills with nothing paid can be cancelled
    pub async fn cancel_bill(&self, bill_id: i64) -> Result<BillView> {
        let txn = self.storage.get_db().begin().await?;
        let current = load_bill(&txn, bill_id).await?;
        if BillStatus::parse(&current.status)? == BillStatus::Cancelled {
            return Err(LabdeskError::conflict(format!(
                "Bill {} is already cancelled",
                current.bill_number
            )));
        }
        if current.paid_amount != 0 {
            return Err(LabdeskError::conflict(format!(
                "Bill {} has payments and cannot be cancelled",
                current.bill_number
            )));
        }

        let result = BillEntity::update_many()
            .col_expr(
                bill::Column::Status,
                Expr::value(BillStatus::Cancelled.to_string()),
            )
            .col_expr(bill::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(bill::Column::Id.eq(bill_id))
            .filter(bill::Column::PaidAmount.eq(0))
            .filter(bill::Column::Status.ne(BillStatus::Cancelled.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(LabdeskError::conflict(format!(
                "Bill {} changed concurrently",
                current.bill_number
            )));
        }
        let model = load_bill(&txn, bill_id).await?;
        txn.commit().await?;

        info!("Bill cancelled: {}", model.bill_number);
        BillView::from_model(model)
    }

    pub async fn get_bill(&self, id: i64) -> Result<BillView> {
        let db = self.storage.get_db();
        let model = load_bill(db, id).await?;
        let items = BillItemEntity::find()
            .filter(bill_item::Column::BillId.eq(id))
            .order_by_asc(bill_item::Column::Id)
            .all(db)
            .await?;
        let mut view = BillView::from_model(model)?;
        view.items = Some(items.into_iter().map(Into::into).collect());
        Ok(view)
    }

    pub async fn list_bills(&self, filter: BillFilter) -> Result<Paged<BillView>> {
        let mut select = BillEntity::find().order_by_desc(bill::Column::CreatedAt);
        if let Some(visit_id) = filter.visit_id {
            select = select.filter(bill::Column::VisitId.eq(visit_id));
        }
        if let Some(branch_id) = filter.branch_id {
            select = select.filter(bill::Column::BranchId.eq(branch_id));
        }
        if let Some(status) = filter.status {
            select = select.filter(bill::Column::Status.eq(status.to_string()));
        }
        if let Some(from) = filter.from {
            select = select.filter(bill::Column::CreatedAt.gte(day_start(from)));
        }
        if let Some(to) = filter.to {
            select = select.filter(bill::Column::CreatedAt.lt(day_after(to)?));
        }

        let Paged {
            items,
            total,
            page,
            page_size,
        } = fetch_page(select, self.storage.get_db(), filter.page, filter.page_size).await?;
        let items = items
            .into_iter()
            .map(BillView::from_model)
            .collect::<Result<Vec<_>>>()?;
        Ok(Paged {
            items,
            total,
            page,
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_of() {
        assert_eq!(total_of([100, 250, 0]).unwrap(), 350);
        assert!(total_of([100, -1]).is_err());
        assert!(total_of([i64::MAX, 1]).is_err());
    }

    #[test]
    fn test_check_discount() {
        assert!(check_discount(0, 500).is_ok());
        assert!(check_discount(500, 500).is_ok());
        assert!(check_discount(501, 500).is_err());
        assert!(check_discount(-1, 500).is_err());
    }
}
