//! Visit endpoints

use actix_web::{HttpResponse, Result as ActixResult, web};
use tracing::{info, trace};

use crate::services::{CreateVisitRequest, VisitFilter, VisitService};

use super::helpers::{api_created, api_result, paged_result};
use super::types::UpdateVisitStatusRequest;

pub async fn create_visit(
    service: web::Data<VisitService>,
    body: web::Json<CreateVisitRequest>,
) -> ActixResult<HttpResponse> {
    trace!(
        "API: create {:?} visit for patient {}",
        body.domain, body.patient_id
    );
    Ok(api_created(service.create_visit(body.into_inner()).await))
}

pub async fn list_visits(
    service: web::Data<VisitService>,
    query: web::Query<VisitFilter>,
) -> ActixResult<HttpResponse> {
    trace!("API: list visits {:?}", query);
    Ok(paged_result(service.list_visits(query.into_inner()).await))
}

pub async fn get_visit(
    service: web::Data<VisitService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.get_visit(path.into_inner()).await))
}

pub async fn update_visit_status(
    service: web::Data<VisitService>,
    path: web::Path<i64>,
    body: web::Json<UpdateVisitStatusRequest>,
) -> ActixResult<HttpResponse> {
    let id = path.into_inner();
    info!("API: visit {} -> {:?}", id, body.status);
    Ok(api_result(service.update_status(id, body.status).await))
}
