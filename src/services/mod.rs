//! Service layer for business logic
//!
//! HTTP handlers stay thin: every rule about patients, visits, bills,
//! results, reports and payouts lives here, on top of `SeaOrmStorage`.
//! Each multi-row operation runs in one transaction.

use std::sync::Arc;

use actix_web::web;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Select};
use serde::Serialize;

use crate::errors::Result;
use crate::storage::SeaOrmStorage;

mod billing_service;
mod catalog_service;
pub mod matching;
pub mod numbering;
mod order_service;
mod patient_service;
mod payout_service;
pub mod render;
mod report_service;
pub mod snapshot;
mod visit_service;

pub use billing_service::*;
pub use catalog_service::*;
pub use matching::{DuplicateCandidate, MatchStrength};
pub use numbering::{NumberGenerator, NumberKind};
pub use order_service::*;
pub use patient_service::*;
pub use payout_service::*;
pub use report_service::*;
pub use visit_service::*;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

impl<T> Paged<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Normalize 1-based page parameters
pub fn clamp_page(page: Option<u64>, page_size: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

/// Run a select as one page, returning the models and the total count
pub(crate) async fn fetch_page<'db, E, C>(
    select: Select<E>,
    conn: &'db C,
    page: Option<u64>,
    page_size: Option<u64>,
) -> Result<Paged<E::Model>>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Send + Sync + 'db,
{
    let (page, page_size) = clamp_page(page, page_size);
    let paginator = select.paginate(conn, page_size);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Paged {
        items,
        total,
        page,
        page_size,
    })
}

/// All services, built once at startup and shared with the HTTP workers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub patients: Arc<PatientService>,
    pub visits: Arc<VisitService>,
    pub orders: Arc<OrderService>,
    pub billing: Arc<BillingService>,
    pub reports: Arc<ReportService>,
    pub payouts: Arc<PayoutService>,
}

impl AppServices {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let numbers = NumberGenerator::from_config();
        Self {
            catalog: Arc::new(CatalogService::new(storage.clone())),
            patients: Arc::new(PatientService::new(storage.clone(), numbers)),
            visits: Arc::new(VisitService::new(storage.clone(), numbers)),
            orders: Arc::new(OrderService::new(storage.clone())),
            billing: Arc::new(BillingService::new(storage.clone(), numbers)),
            reports: Arc::new(ReportService::new(storage.clone(), numbers)),
            payouts: Arc::new(PayoutService::new(storage)),
        }
    }

    /// Register every service as app data
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(self.catalog.clone()))
            .app_data(web::Data::from(self.patients.clone()))
            .app_data(web::Data::from(self.visits.clone()))
            .app_data(web::Data::from(self.orders.clone()))
            .app_data(web::Data::from(self.billing.clone()))
            .app_data(web::Data::from(self.reports.clone()))
            .app_data(web::Data::from(self.payouts.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page_defaults_and_limits() {
        assert_eq!(clamp_page(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(clamp_page(Some(0), Some(0)), (1, 1));
        assert_eq!(clamp_page(Some(3), Some(500)), (3, MAX_PAGE_SIZE));
    }

    #[test]
    fn test_paged_map_keeps_counts() {
        let page = Paged {
            items: vec![1, 2, 3],
            total: 13,
            page: 2,
            page_size: 3,
        };
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.items, vec![10, 20, 30]);
        assert_eq!(mapped.total, 13);
        assert_eq!(mapped.page, 2);
    }
}
