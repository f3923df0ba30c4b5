//! API v1 路由配置
//!
//! 按资源拆分 scope，最后在 `/api/v1` 下组合并挂上 token 校验。

use actix_web::web;

use crate::api::middleware::ApiTokenGuard;

use super::billing::{cancel_bill, create_bill, get_bill, list_bills, record_payment};
use super::catalog::{
    create_branch, create_doctor, create_lab_test, deactivate_branch, deactivate_doctor,
    deactivate_lab_test, get_branch, get_doctor, get_lab_test, list_branches, list_doctors,
    list_lab_tests, update_branch, update_doctor, update_lab_test,
};
use super::patients::{
    add_identifier, check_duplicates, create_patient, get_patient, list_identifiers,
    list_patients, set_primary_identifier, update_patient,
};
use super::payouts::{
    compute_ledger, delete_ledger, export_ledger, get_ledger, list_ledgers, mark_paid,
};
use super::reports::{
    amend_report, create_draft, delete_report, finalize_report, get_report, list_versions,
    render_report,
};
use super::results::{add_orders, cancel_order, list_results, record_result};
use super::visits::{create_visit, get_visit, list_visits, update_visit_status};

/// 患者路由 `/patients`
///
/// - POST /patients - 建档（精确匹配返回已有患者）
/// - GET /patients - 搜索
/// - POST /patients/duplicates - 仅做查重
/// - GET/PUT /patients/{id}
/// - GET/POST /patients/{id}/identifiers
/// - PUT /patients/{id}/identifiers/{identifier_id}/primary
pub fn patients_routes() -> actix_web::Scope {
    web::scope("/patients")
        .route("", web::get().to(list_patients))
        .route("", web::post().to(create_patient))
        // must be before /{id}
        .route("/duplicates", web::post().to(check_duplicates))
        .route("/{id}", web::get().to(get_patient))
        .route("/{id}", web::put().to(update_patient))
        .route("/{id}/identifiers", web::get().to(list_identifiers))
        .route("/{id}/identifiers", web::post().to(add_identifier))
        .route(
            "/{id}/identifiers/{identifier_id}/primary",
            web::put().to(set_primary_identifier),
        )
}

/// 目录路由 `/branches`, `/doctors`, `/lab-tests`
///
/// DELETE 只做停用，不物理删除。
pub fn catalog_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/branches")
            .route("", web::get().to(list_branches))
            .route("", web::post().to(create_branch))
            .route("/{id}", web::get().to(get_branch))
            .route("/{id}", web::put().to(update_branch))
            .route("/{id}", web::delete().to(deactivate_branch)),
    )
    .service(
        web::scope("/doctors")
            .route("", web::get().to(list_doctors))
            .route("", web::post().to(create_doctor))
            .route("/{id}", web::get().to(get_doctor))
            .route("/{id}", web::put().to(update_doctor))
            .route("/{id}", web::delete().to(deactivate_doctor)),
    )
    .service(
        web::scope("/lab-tests")
            .route("", web::get().to(list_lab_tests))
            .route("", web::post().to(create_lab_test))
            .route("/{id}", web::get().to(get_lab_test))
            .route("/{id}", web::put().to(update_lab_test))
            .route("/{id}", web::delete().to(deactivate_lab_test)),
    );
}

/// 就诊路由 `/visits`
///
/// 订单、结果和报告草稿都挂在就诊下。
pub fn visits_routes() -> actix_web::Scope {
    web::scope("/visits")
        .route("", web::get().to(list_visits))
        .route("", web::post().to(create_visit))
        .route("/{id}", web::get().to(get_visit))
        .route("/{id}/status", web::put().to(update_visit_status))
        .route("/{id}/orders", web::post().to(add_orders))
        .route("/{id}/results", web::get().to(list_results))
        .route("/{id}/reports", web::get().to(list_versions))
        .route("/{id}/reports", web::post().to(create_draft))
}

/// 检验单路由 `/orders`
pub fn orders_routes() -> actix_web::Scope {
    web::scope("/orders")
        .route("/{id}/cancel", web::post().to(cancel_order))
        .route("/{id}/result", web::put().to(record_result))
}

/// 账单路由 `/bills`
pub fn bills_routes() -> actix_web::Scope {
    web::scope("/bills")
        .route("", web::get().to(list_bills))
        .route("", web::post().to(create_bill))
        .route("/{id}", web::get().to(get_bill))
        .route("/{id}/payments", web::post().to(record_payment))
        .route("/{id}/cancel", web::post().to(cancel_bill))
}

/// 报告路由 `/reports`
pub fn reports_routes() -> actix_web::Scope {
    web::scope("/reports")
        .route("/{id}", web::get().to(get_report))
        .route("/{id}", web::delete().to(delete_report))
        .route("/{id}/finalize", web::post().to(finalize_report))
        .route("/{id}/amend", web::post().to(amend_report))
        .route("/{id}/html", web::get().to(render_report))
}

/// 医生结算路由 `/payouts`
pub fn payouts_routes() -> actix_web::Scope {
    web::scope("/payouts")
        .route("", web::get().to(list_ledgers))
        .route("", web::post().to(compute_ledger))
        .route("/{id}", web::get().to(get_ledger))
        .route("/{id}", web::delete().to(delete_ledger))
        .route("/{id}/pay", web::post().to(mark_paid))
        .route("/{id}/export", web::get().to(export_ledger))
}

/// API v1 路由，组合所有子模块路由，整体挂上 token 校验
pub fn v1_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .wrap(ApiTokenGuard::from_config())
            .service(patients_routes())
            .configure(catalog_routes)
            .service(visits_routes())
            .service(orders_routes())
            .service(bills_routes())
            .service(reports_routes())
            .service(payouts_routes()),
    );
}
