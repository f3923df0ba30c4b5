//! Bearer token guard for `/api/v1`
//!
//! The configured token is compared in constant time. An empty token turns
//! the guard off, which is how local development runs.

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::{Method, header::AUTHORIZATION, header::CONTENT_TYPE},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use subtle::ConstantTimeEq;
use tracing::{info, trace};

use crate::api::services::v1::{ApiResponse, ErrorCode};

/// API token authentication middleware
#[derive(Clone)]
pub struct ApiTokenGuard {
    token: Option<Rc<str>>,
}

impl ApiTokenGuard {
    /// `None` or an empty token lets every request through
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Rc::from),
        }
    }

    pub fn from_config() -> Self {
        Self::new(Some(crate::config::get_config().api.token.clone()))
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiTokenGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiTokenMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiTokenMiddleware {
            service: Rc::new(service),
            token: self.token.clone(),
        }))
    }
}

pub struct ApiTokenMiddleware<S> {
    service: Rc<S>,
    token: Option<Rc<str>>,
}

impl<S, B> ApiTokenMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    /// Handle unauthorized requests
    fn handle_unauthorized(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        info!(
            "API authentication failed for {} {}",
            req.method(),
            req.path()
        );
        req.into_response(
            HttpResponse::Unauthorized()
                .insert_header((CONTENT_TYPE, "application/json; charset=utf-8"))
                .insert_header(("WWW-Authenticate", "Bearer"))
                .json(ApiResponse::<()> {
                    code: ErrorCode::Unauthorized as i32,
                    message: "Unauthorized: Invalid or missing token".to_string(),
                    data: None,
                })
                .map_into_right_body(),
        )
    }

    /// 从 Authorization header 提取 Bearer token
    fn extract_bearer_token(req: &ServiceRequest) -> Option<&str> {
        req.headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
    }
}

/// Constant-time token comparison
pub fn token_matches(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

impl<S, B> Service<ServiceRequest> for ApiTokenMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        let token = self.token.clone();

        Box::pin(async move {
            let Some(expected) = token else {
                return Ok(srv.call(req).await?.map_into_left_body());
            };

            // CORS preflight carries no credentials
            if req.method() == Method::OPTIONS {
                return Ok(srv.call(req).await?.map_into_left_body());
            }

            let authorized = Self::extract_bearer_token(&req)
                .is_some_and(|presented| token_matches(&expected, presented));
            if !authorized {
                return Ok(Self::handle_unauthorized(req));
            }

            trace!("API authentication successful");
            Ok(srv.call(req).await?.map_into_left_body())
        })
    }
}
