//! API 帮助函数

use actix_web::error::{InternalError, JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use serde::Serialize;
use tracing::{debug, error};

use crate::errors::LabdeskError;
use crate::services::Paged;

use super::error_code::ErrorCode;
use super::types::{ApiResponse, PaginatedResponse, PaginationInfo};

/// 构建 JSON 响应
pub fn json_response<T: Serialize>(
    status: StatusCode,
    code: ErrorCode,
    message: impl Into<String>,
    data: Option<T>,
) -> HttpResponse {
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse {
            code: code as i32,
            message: message.into(),
            data,
        })
}

/// 构建成功响应
pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::OK, ErrorCode::Success, "OK", Some(data))
}

/// 201 Created
pub fn created_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::CREATED, ErrorCode::Success, "Created", Some(data))
}

/// 构建错误响应
pub fn error_response(status: StatusCode, error_code: ErrorCode, message: &str) -> HttpResponse {
    json_response::<()>(status, error_code, message, None)
}

/// 从 LabdeskError 构建错误响应（自动映射 HTTP 状态码和 ErrorCode）
///
/// 重复患者错误把候选列表放进 `data`，前端据此让操作员选择。
pub fn error_from_labdesk(err: &LabdeskError) -> HttpResponse {
    let status = err.http_status();
    let error_code = ErrorCode::from(err);
    if status.is_server_error() {
        error!("API request failed: {}", err);
    } else {
        debug!("API request rejected: {}", err);
    }
    match err.candidates() {
        Some(candidates) => json_response(status, error_code, err.message(), Some(candidates)),
        None => error_response(status, error_code, err.message()),
    }
}

/// 统一 Result → HttpResponse 转换
///
/// 成功时返回 200 OK + JSON 数据，失败时自动映射 LabdeskError。
pub fn api_result<T, E>(result: Result<T, E>) -> HttpResponse
where
    T: Serialize,
    E: Into<LabdeskError>,
{
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_from_labdesk(&e.into()),
    }
}

/// Same as [`api_result`] but answers 201 on success
pub fn api_created<T, E>(result: Result<T, E>) -> HttpResponse
where
    T: Serialize,
    E: Into<LabdeskError>,
{
    match result {
        Ok(data) => created_response(data),
        Err(e) => error_from_labdesk(&e.into()),
    }
}

/// 分页列表响应
pub fn paginated_response<T: Serialize>(page: Paged<T>) -> HttpResponse {
    HttpResponse::Ok()
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(PaginatedResponse {
            code: ErrorCode::Success as i32,
            pagination: PaginationInfo::new(page.page, page.page_size, page.total),
            data: page.items,
        })
}

pub fn paged_result<T: Serialize>(result: crate::errors::Result<Paged<T>>) -> HttpResponse {
    match result {
        Ok(page) => paginated_response(page),
        Err(e) => error_from_labdesk(&e),
    }
}

/// Body 解析失败时返回统一信封而不是 actix 的纯文本
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = match &err {
        JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
            error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorCode::PayloadTooLarge,
                "Request body too large",
            )
        }
        _ => error_response(
            StatusCode::BAD_REQUEST,
            ErrorCode::BadRequest,
            &format!("Invalid JSON body: {}", err),
        ),
    };
    InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(
        StatusCode::BAD_REQUEST,
        ErrorCode::BadRequest,
        &format!("Invalid query string: {}", err),
    );
    InternalError::from_response(err, response).into()
}

pub fn path_error_handler(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(
        StatusCode::BAD_REQUEST,
        ErrorCode::BadRequest,
        &format!("Invalid path parameter: {}", err),
    );
    InternalError::from_response(err, response).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{DuplicateCandidate, MatchStrength};
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_not_found_maps_to_404_envelope() {
        let resp = error_from_labdesk(&LabdeskError::not_found("Patient 9 not found"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], ErrorCode::NotFound as i32);
        assert_eq!(json["message"], "Patient 9 not found");
        assert!(json["data"].is_null());
    }

    #[actix_web::test]
    async fn test_duplicate_patient_carries_candidates() {
        let candidate = DuplicateCandidate {
            patient_id: 4,
            patient_number: "PAT-MAIN-000004".into(),
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            date_of_birth: None,
            strength: MatchStrength::Probable,
        };
        let err = LabdeskError::duplicate_patient("possible duplicate", vec![candidate]);
        let resp = error_from_labdesk(&err);
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], ErrorCode::DuplicatePatient as i32);
        assert_eq!(json["data"][0]["patient_id"], 4);
        assert_eq!(json["data"][0]["strength"], "PROBABLE");
    }

    #[actix_web::test]
    async fn test_paginated_response_shape() {
        let resp = paginated_response(Paged {
            items: vec![1, 2],
            total: 5,
            page: 1,
            page_size: 2,
        });
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["pagination"]["total_pages"], 3);
    }
}
