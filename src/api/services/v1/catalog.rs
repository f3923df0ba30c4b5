//! Branch, doctor and lab test catalog endpoints

use actix_web::{HttpResponse, Result as ActixResult, web};
use tracing::trace;

use crate::services::{
    CatalogListQuery, CatalogService, CreateBranchRequest, CreateDoctorRequest,
    CreateLabTestRequest, DoctorFilter, UpdateBranchRequest, UpdateDoctorRequest,
    UpdateLabTestRequest,
};

use super::helpers::{api_created, api_result, paged_result};

// Branches

pub async fn create_branch(
    service: web::Data<CatalogService>,
    body: web::Json<CreateBranchRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(service.create_branch(body.into_inner()).await))
}

pub async fn list_branches(
    service: web::Data<CatalogService>,
    query: web::Query<CatalogListQuery>,
) -> ActixResult<HttpResponse> {
    trace!("API: list branches {:?}", query);
    Ok(paged_result(service.list_branches(query.into_inner()).await))
}

pub async fn get_branch(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.get_branch(path.into_inner()).await))
}

pub async fn update_branch(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
    body: web::Json<UpdateBranchRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        service
            .update_branch(path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn deactivate_branch(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.deactivate_branch(path.into_inner()).await))
}

// Doctors

pub async fn create_doctor(
    service: web::Data<CatalogService>,
    body: web::Json<CreateDoctorRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(service.create_doctor(body.into_inner()).await))
}

pub async fn list_doctors(
    service: web::Data<CatalogService>,
    query: web::Query<DoctorFilter>,
) -> ActixResult<HttpResponse> {
    trace!("API: list doctors {:?}", query);
    Ok(paged_result(service.list_doctors(query.into_inner()).await))
}

pub async fn get_doctor(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.get_doctor(path.into_inner()).await))
}

pub async fn update_doctor(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
    body: web::Json<UpdateDoctorRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        service
            .update_doctor(path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn deactivate_doctor(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.deactivate_doctor(path.into_inner()).await))
}

// Lab tests

pub async fn create_lab_test(
    service: web::Data<CatalogService>,
    body: web::Json<CreateLabTestRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(service.create_lab_test(body.into_inner()).await))
}

pub async fn list_lab_tests(
    service: web::Data<CatalogService>,
    query: web::Query<CatalogListQuery>,
) -> ActixResult<HttpResponse> {
    trace!("API: list lab tests {:?}", query);
    Ok(paged_result(service.list_lab_tests(query.into_inner()).await))
}

pub async fn get_lab_test(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.get_lab_test(path.into_inner()).await))
}

pub async fn update_lab_test(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
    body: web::Json<UpdateLabTestRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        service
            .update_lab_test(path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn deactivate_lab_test(
    service: web::Data<CatalogService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.deactivate_lab_test(path.into_inner()).await))
}
