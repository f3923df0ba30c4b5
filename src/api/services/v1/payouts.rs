//! Doctor payout ledger endpoints

use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpResponse, Result as ActixResult, web};
use tracing::info;

use crate::services::{ComputePayoutRequest, LedgerFilter, MarkPaidRequest, PayoutService};

use super::helpers::{api_created, api_result, error_from_labdesk, paged_result};
use super::types::DeletedResponse;

pub async fn compute_ledger(
    service: web::Data<PayoutService>,
    body: web::Json<ComputePayoutRequest>,
) -> ActixResult<HttpResponse> {
    info!(
        "API: compute payout for doctor {} ({} .. {})",
        body.doctor_id, body.period_start, body.period_end
    );
    Ok(api_created(service.compute(body.into_inner()).await))
}

pub async fn list_ledgers(
    service: web::Data<PayoutService>,
    query: web::Query<LedgerFilter>,
) -> ActixResult<HttpResponse> {
    Ok(paged_result(service.list_ledgers(query.into_inner()).await))
}

pub async fn get_ledger(
    service: web::Data<PayoutService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.get_ledger(path.into_inner()).await))
}

pub async fn mark_paid(
    service: web::Data<PayoutService>,
    path: web::Path<i64>,
    body: web::Json<MarkPaidRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        service.mark_paid(path.into_inner(), &body.reference).await,
    ))
}

pub async fn delete_ledger(
    service: web::Data<PayoutService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    let id = path.into_inner();
    Ok(api_result(
        service
            .delete_ledger(id)
            .await
            .map(|()| DeletedResponse { id, deleted: true }),
    ))
}

/// CSV 下载
pub async fn export_ledger(
    service: web::Data<PayoutService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    let id = path.into_inner();
    Ok(match service.export_csv(id).await {
        Ok(csv) => HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(format!(
                    "payout_ledger_{}.csv",
                    id
                ))],
            })
            .body(csv),
        Err(e) => error_from_labdesk(&e),
    })
}
