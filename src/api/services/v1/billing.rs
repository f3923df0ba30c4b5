//! Billing endpoints

use actix_web::{HttpResponse, Result as ActixResult, web};
use tracing::{info, trace};

use crate::services::{BillFilter, BillingService, CreateBillRequest, RecordPaymentRequest};

use super::helpers::{api_created, api_result, paged_result};

pub async fn create_bill(
    service: web::Data<BillingService>,
    body: web::Json<CreateBillRequest>,
) -> ActixResult<HttpResponse> {
    trace!("API: create bill for visit {}", body.visit_id);
    Ok(api_created(service.create_bill(body.into_inner()).await))
}

pub async fn list_bills(
    service: web::Data<BillingService>,
    query: web::Query<BillFilter>,
) -> ActixResult<HttpResponse> {
    trace!("API: list bills {:?}", query);
    Ok(paged_result(service.list_bills(query.into_inner()).await))
}

pub async fn get_bill(
    service: web::Data<BillingService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.get_bill(path.into_inner()).await))
}

pub async fn record_payment(
    service: web::Data<BillingService>,
    path: web::Path<i64>,
    body: web::Json<RecordPaymentRequest>,
) -> ActixResult<HttpResponse> {
    let bill_id = path.into_inner();
    info!("API: payment of {} on bill {}", body.amount, bill_id);
    Ok(api_result(service.record_payment(bill_id, body.amount).await))
}

pub async fn cancel_bill(
    service: web::Data<BillingService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.cancel_bill(path.into_inner()).await))
}
