//! Test orders and their results

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use migration::entities::{
    LabTestEntity, TestOrderEntity, TestResultEntity, lab_test, test_order, test_result,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::matching::normalize_name;
use super::visit_service::{load_active_visit, load_visit};
use crate::errors::{LabdeskError, Result};
use crate::storage::{OrderStatus, ResultFlag, SeaOrmStorage};

const NEGATIONS: [&str; 3] = ["no", "non", "not"];

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub id: i64,
    pub visit_id: i64,
    pub lab_test_id: i64,
    pub test_code: String,
    pub test_name: String,
    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
}

impl OrderView {
    fn build(order: test_order::Model, test: &lab_test::Model) -> Result<Self> {
        Ok(Self {
            status: OrderStatus::parse(&order.status)?,
            id: order.id,
            visit_id: order.visit_id,
            lab_test_id: order.lab_test_id,
            test_code: test.code.clone(),
            test_name: test.name.clone(),
            ordered_at: order.ordered_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddOrdersRequest {
    pub test_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordResultRequest {
    pub value: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub id: i64,
    pub test_order_id: i64,
    pub value: String,
    pub numeric_value: Option<f64>,
    pub flag: ResultFlag,
    pub remarks: Option<String>,
    pub entered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResultView {
    fn from_model(m: test_result::Model) -> Result<Self> {
        Ok(Self {
            flag: ResultFlag::parse(&m.flag)?,
            id: m.id,
            test_order_id: m.test_order_id,
            value: m.value,
            numeric_value: m.numeric_value,
            remarks: m.remarks,
            entered_at: m.entered_at,
            updated_at: m.updated_at,
        })
    }
}

/// An order with its test definition and result, if any
#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub order_id: i64,
    pub order_status: OrderStatus,
    pub lab_test_id: i64,
    pub test_code: String,
    pub test_name: String,
    pub unit: Option<String>,
    pub ref_low: Option<f64>,
    pub ref_high: Option<f64>,
    pub result: Option<ResultView>,
}

/// Flag a result value against a reference range
///
/// Numbers are compared to the range. Free text is ABNORMAL when it
/// contains a keyword, matched as a whole run of words, that is not
/// preceded by a negation ("non reactive", "not detected").
/// Keywords may span several words ("growth seen").
pub fn compute_flag(
    value: &str,
    ref_low: Option<f64>,
    ref_high: Option<f64>,
    abnormal_keywords: &[String],
) -> (Option<f64>, ResultFlag) {
    if let Ok(number) = value.trim().parse::<f64>()
        && number.is_finite()
    {
        let flag = match (ref_low, ref_high) {
            (Some(low), _) if number < low => ResultFlag::Low,
            (_, Some(high)) if number > high => ResultFlag::High,
            _ => ResultFlag::Normal,
        };
        return (Some(number), flag);
    }

    let normalized = normalize_name(value);
    let tokens: Vec<&str> = normalized.split(' ').collect();
    let abnormal = abnormal_keywords.iter().any(|keyword| {
        let keyword = normalize_name(keyword);
        let words: Vec<&str> = keyword.split(' ').filter(|w| !w.is_empty()).collect();
        if words.is_empty() {
            return false;
        }
        tokens
            .windows(words.len())
            .enumerate()
            .any(|(i, window)| {
                window == words.as_slice() && !(i > 0 && NEGATIONS.contains(&tokens[i - 1]))
            })
    });
    let flag = if abnormal {
        ResultFlag::Abnormal
    } else {
        ResultFlag::Normal
    };
    (None, flag)
}

/// Create one ORDERED row per test id
pub(crate) async fn insert_orders(
    txn: &DatabaseTransaction,
    visit_id: i64,
    test_ids: &[i64],
) -> Result<Vec<OrderView>> {
    let tests: HashMap<i64, lab_test::Model> = LabTestEntity::find()
        .filter(lab_test::Column::Id.is_in(test_ids.iter().copied()))
        .all(txn)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let now = Utc::now();
    let mut orders = Vec::with_capacity(test_ids.len());
    for id in test_ids {
        let test = tests
            .get(id)
            .ok_or_else(|| LabdeskError::not_found(format!("Lab test {} not found", id)))?;
        if !test.active {
            return Err(LabdeskError::validation(format!(
                "Lab test {} is inactive",
                test.code
            )));
        }
        let order = test_order::ActiveModel {
            visit_id: Set(visit_id),
            lab_test_id: Set(test.id),
            status: Set(OrderStatus::Ordered.to_string()),
            ordered_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        orders.push(OrderView::build(order, test)?);
    }
    Ok(orders)
}

/// Orders of a visit with their test names
pub(crate) async fn orders_of<C: ConnectionTrait>(conn: &C, visit_id: i64) -> Result<Vec<OrderView>> {
    let rows = TestOrderEntity::find()
        .filter(test_order::Column::VisitId.eq(visit_id))
        .order_by_asc(test_order::Column::Id)
        .find_also_related(LabTestEntity)
        .all(conn)
        .await?;
    rows.into_iter()
        .map(|(order, test)| {
            let test = test.ok_or_else(|| {
                LabdeskError::database_operation(format!(
                    "Order {} points at a missing lab test",
                    order.id
                ))
            })?;
            OrderView::build(order, &test)
        })
        .collect()
}

/// Orders of a visit joined with tests and results, in order id order
pub(crate) async fn result_rows<C: ConnectionTrait>(conn: &C, visit_id: i64) -> Result<Vec<ResultRow>> {
    let orders = TestOrderEntity::find()
        .filter(test_order::Column::VisitId.eq(visit_id))
        .order_by_asc(test_order::Column::Id)
        .find_also_related(LabTestEntity)
        .all(conn)
        .await?;
    let order_ids: Vec<i64> = orders.iter().map(|(o, _)| o.id).collect();
    let mut results: HashMap<i64, test_result::Model> = TestResultEntity::find()
        .filter(test_result::Column::TestOrderId.is_in(order_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| (r.test_order_id, r))
        .collect();

    let mut rows = Vec::with_capacity(orders.len());
    for (order, test) in orders {
        let test = test.ok_or_else(|| {
            LabdeskError::database_operation(format!(
                "Order {} points at a missing lab test",
                order.id
            ))
        })?;
        let result = results
            .remove(&order.id)
            .map(ResultView::from_model)
            .transpose()?;
        rows.push(ResultRow {
            order_id: order.id,
            order_status: OrderStatus::parse(&order.status)?,
            lab_test_id: test.id,
            test_code: test.code,
            test_name: test.name,
            unit: test.unit,
            ref_low: test.ref_low,
            ref_high: test.ref_high,
            result,
        });
    }
    Ok(rows)
}

async fn load_order<C: ConnectionTrait>(conn: &C, id: i64) -> Result<test_order::Model> {
    TestOrderEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Order {} not found", id)))
}

pub struct OrderService {
    storage: Arc<SeaOrmStorage>,
}

impl OrderService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn add_orders(&self, visit_id: i64, test_ids: Vec<i64>) -> Result<Vec<OrderView>> {
        if test_ids.is_empty() {
            return Err(LabdeskError::validation("test_ids must not be empty"));
        }
        let txn = self.storage.get_db().begin().await?;
        let visit = load_active_visit(&txn, visit_id).await?;
        let orders = insert_orders(&txn, visit.id, &test_ids).await?;
        txn.commit().await?;
        info!("{} order(s) added to visit {}", orders.len(), visit.visit_number);
        Ok(orders)
    }

    /// Only orders without a result can be cancelled
    pub async fn cancel_order(&self, order_id: i64) -> Result<OrderView> {
        let txn = self.storage.get_db().begin().await?;
        let order = load_order(&txn, order_id).await?;
        let status = OrderStatus::parse(&order.status)?;
        if status != OrderStatus::Ordered {
            return Err(LabdeskError::conflict(format!(
                "Order {} is {} and cannot be cancelled",
                order_id, status
            )));
        }

        let result = TestOrderEntity::update_many()
            .col_expr(
                test_order::Column::Status,
                Expr::value(OrderStatus::Cancelled.to_string()),
            )
            .filter(test_order::Column::Id.eq(order_id))
            .filter(test_order::Column::Status.eq(OrderStatus::Ordered.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(LabdeskError::conflict(format!(
                "Order {} changed concurrently",
                order_id
            )));
        }

        let order = load_order(&txn, order_id).await?;
        let test = LabTestEntity::find_by_id(order.lab_test_id)
            .one(&txn)
            .await?
            .ok_or_else(|| LabdeskError::not_found(format!("Lab test {} not found", order.lab_test_id)))?;
        txn.commit().await?;

        info!("Order {} cancelled", order_id);
        OrderView::build(order, &test)
    }

    /// Insert or replace the result of an order and mark it RESULTED
    pub async fn record_result(
        &self,
        order_id: i64,
        req: RecordResultRequest,
    ) -> Result<ResultView> {
        let value = req.value.trim().to_string();
        if value.is_empty() {
            return Err(LabdeskError::validation("value must not be empty"));
        }

        let txn = self.storage.get_db().begin().await?;
        let order = load_order(&txn, order_id).await?;
        if OrderStatus::parse(&order.status)? == OrderStatus::Cancelled {
            return Err(LabdeskError::validation(format!(
                "Order {} is cancelled",
                order_id
            )));
        }
        load_active_visit(&txn, order.visit_id).await?;
        let test = LabTestEntity::find_by_id(order.lab_test_id)
            .one(&txn)
            .await?
            .ok_or_else(|| LabdeskError::not_found(format!("Lab test {} not found", order.lab_test_id)))?;

        let config = crate::config::get_config();
        let (numeric_value, flag) = compute_flag(
            &value,
            test.ref_low,
            test.ref_high,
            &config.reports.abnormal_keywords,
        );

        let now = Utc::now();
        let existing = TestResultEntity::find()
            .filter(test_result::Column::TestOrderId.eq(order_id))
            .one(&txn)
            .await?;
        let model = match existing {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.value = Set(value);
                active.numeric_value = Set(numeric_value);
                active.flag = Set(flag.to_string());
                active.remarks = Set(req.remarks);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                test_result::ActiveModel {
                    test_order_id: Set(order_id),
                    value: Set(value),
                    numeric_value: Set(numeric_value),
                    flag: Set(flag.to_string()),
                    remarks: Set(req.remarks),
                    entered_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        TestOrderEntity::update_many()
            .col_expr(
                test_order::Column::Status,
                Expr::value(OrderStatus::Resulted.to_string()),
            )
            .filter(test_order::Column::Id.eq(order_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!("Result recorded for order {} ({}): {}", order_id, test.code, flag);
        ResultView::from_model(model)
    }

    pub async fn list_results(&self, visit_id: i64) -> Result<Vec<ResultRow>> {
        let db = self.storage.get_db();
        load_visit(db, visit_id).await?;
        result_rows(db, visit_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        ["positive", "reactive", "detected"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_numeric_flags() {
        let k = keywords();
        assert_eq!(compute_flag("3.2", Some(4.0), Some(11.0), &k), (Some(3.2), ResultFlag::Low));
        assert_eq!(compute_flag(" 12 ", Some(4.0), Some(11.0), &k), (Some(12.0), ResultFlag::High));
        assert_eq!(compute_flag("4", Some(4.0), Some(11.0), &k), (Some(4.0), ResultFlag::Normal));
        assert_eq!(compute_flag("500", None, None, &k), (Some(500.0), ResultFlag::Normal));
        assert_eq!(compute_flag("9", None, Some(8.0), &k).1, ResultFlag::High);
    }

    #[test]
    fn test_keyword_flags_respect_negation() {
        let k = keywords();
        assert_eq!(compute_flag("Reactive", None, None, &k).1, ResultFlag::Abnormal);
        assert_eq!(compute_flag("HBsAg positive", None, None, &k).1, ResultFlag::Abnormal);
        assert_eq!(compute_flag("Non-Reactive", None, None, &k).1, ResultFlag::Normal);
        assert_eq!(compute_flag("Not detected", None, None, &k).1, ResultFlag::Normal);
        assert_eq!(compute_flag("Negative", None, None, &k).1, ResultFlag::Normal);
    }

    #[test]
    fn test_multi_word_keywords() {
        let k = vec!["Growth seen".to_string(), "  ".to_string()];
        assert_eq!(
            compute_flag("Culture: growth seen after 48h", None, None, &k).1,
            ResultFlag::Abnormal
        );
        assert_eq!(compute_flag("No growth seen", None, None, &k).1, ResultFlag::Normal);
        assert_eq!(compute_flag("growth", None, None, &k).1, ResultFlag::Normal);
        assert_eq!(compute_flag("seen growth", None, None, &k).1, ResultFlag::Normal);
    }

    #[test]
    fn test_non_finite_numbers_are_text() {
        let (numeric, flag) = compute_flag("NaN", Some(1.0), Some(2.0), &keywords());
        assert_eq!(numeric, None);
        assert_eq!(flag, ResultFlag::Normal);
    }
}
