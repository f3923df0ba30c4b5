//! Test order and result endpoints

use actix_web::{HttpResponse, Result as ActixResult, web};
use tracing::trace;

use crate::services::{AddOrdersRequest, OrderService, RecordResultRequest};

use super::helpers::{api_created, api_result};

pub async fn add_orders(
    service: web::Data<OrderService>,
    path: web::Path<i64>,
    body: web::Json<AddOrdersRequest>,
) -> ActixResult<HttpResponse> {
    let visit_id = path.into_inner();
    let AddOrdersRequest { test_ids } = body.into_inner();
    trace!("API: add {} order(s) to visit {}", test_ids.len(), visit_id);
    Ok(api_created(service.add_orders(visit_id, test_ids).await))
}

pub async fn cancel_order(
    service: web::Data<OrderService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.cancel_order(path.into_inner()).await))
}

pub async fn record_result(
    service: web::Data<OrderService>,
    path: web::Path<i64>,
    body: web::Json<RecordResultRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        service
            .record_result(path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn list_results(
    service: web::Data<OrderService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.list_results(path.into_inner()).await))
}
