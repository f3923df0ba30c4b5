//! Patient registration and identity endpoints

use actix_web::{HttpResponse, Result as ActixResult, web};
use tracing::{info, trace};

use crate::services::{
    CreatePatientRequest, DuplicateCheckRequest, IdentifierInput, PatientFilter, PatientService,
    UpdatePatientRequest,
};

use super::helpers::{
    api_created, api_result, created_response, error_from_labdesk, paged_result, success_response,
};

/// 建档：精确匹配时返回已有患者（200），否则新建（201）
pub async fn create_patient(
    service: web::Data<PatientService>,
    body: web::Json<CreatePatientRequest>,
) -> ActixResult<HttpResponse> {
    trace!("API: create patient for branch {}", body.branch_id);
    Ok(match service.create_patient(body.into_inner()).await {
        Ok(outcome) if outcome.created => {
            info!("API: patient {} registered", outcome.patient.patient_number);
            created_response(outcome)
        }
        Ok(outcome) => {
            info!(
                "API: exact match, reusing patient {}",
                outcome.patient.patient_number
            );
            success_response(outcome)
        }
        Err(e) => error_from_labdesk(&e),
    })
}

pub async fn check_duplicates(
    service: web::Data<PatientService>,
    body: web::Json<DuplicateCheckRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.find_duplicates(body.into_inner()).await))
}

pub async fn list_patients(
    service: web::Data<PatientService>,
    query: web::Query<PatientFilter>,
) -> ActixResult<HttpResponse> {
    trace!("API: list patients {:?}", query);
    Ok(paged_result(service.list_patients(query.into_inner()).await))
}

pub async fn get_patient(
    service: web::Data<PatientService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.get_patient(path.into_inner()).await))
}

pub async fn update_patient(
    service: web::Data<PatientService>,
    path: web::Path<i64>,
    body: web::Json<UpdatePatientRequest>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(
        service
            .update_patient(path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn list_identifiers(
    service: web::Data<PatientService>,
    path: web::Path<i64>,
) -> ActixResult<HttpResponse> {
    Ok(api_result(service.list_identifiers(path.into_inner()).await))
}

pub async fn add_identifier(
    service: web::Data<PatientService>,
    path: web::Path<i64>,
    body: web::Json<IdentifierInput>,
) -> ActixResult<HttpResponse> {
    Ok(api_created(
        service
            .add_identifier(path.into_inner(), body.into_inner())
            .await,
    ))
}

pub async fn set_primary_identifier(
    service: web::Data<PatientService>,
    path: web::Path<(i64, i64)>,
) -> ActixResult<HttpResponse> {
    let (patient_id, identifier_id) = path.into_inner();
    Ok(api_result(
        service
            .set_primary_identifier(patient_id, identifier_id)
            .await,
    ))
}
