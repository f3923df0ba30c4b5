//! Report lifecycle endpoints
//!
//! Draft → finalize → amend. The HTML rendering of a finalized report
//! always comes from its stored snapshot.

use actix_web::{HttpResponse, Result as ActixResult, web};
use tracing::info;

use crate::services::{FinalizeReportRequest, ReportService};

use super::helpers::{api_created, api_result, error_from_labdesk};
use super::types::DeletedResponse;

pub async fn create_draft(
    service: web::Data<ReportService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(service.create_draft(path.into_inner()).await))
}

pub async fn list_versions(
    service: web::Data<ReportService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.list_versions(path.into_inner()).await))
}

pub async fn get_report(
    service: web::Data<ReportService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.get_report(path.into_inner()).await))
}

pub async fn finalize_report(
    service: web::Data<ReportService>,
    path: web::Path<i64>,
    body: web::Json<FinalizeReportRequest>,
) -> ActixResult<HttpResponse> {
    let report_id = path.into_inner();
    info!(
        "API: finalize report {} signed by doctor {}",
        report_id, body.signed_by_doctor_id
    );
    Ok(api_result(
        service
            .finalize(report_id, body.signed_by_doctor_id)
            .await,
    ))
}

pub async fn amend_report(
    service: web::Data<ReportService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(service.amend(path.into_inner()).await))
}

pub async fn render_report(
    service: web::Data<ReportService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(match service.render_html(path.into_inner()).await {
        Ok(html) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(html),
        Err(e) => error_from_labdesk(&e),
    })
}

pub async fn delete_report(
    service: web::Data<ReportService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    let id = path.into_inner();
    Ok(api_result(
        service
            .delete_report(id)
            .await
            .map(|()| DeletedResponse { id, deleted: true }),
    ))
}
