//! Branch, doctor and lab test catalog
//!
//! Rows are never deleted: visits, bills and ledgers keep pointing at them,
//! so removal is a deactivation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use migration::entities::{
    BranchEntity, DoctorEntity, LabTestEntity, branch, doctor, lab_test,
};
use moka::future::Cache;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Paged, fetch_page};
use crate::errors::{LabdeskError, Result};
use crate::storage::{DoctorKind, SeaOrmStorage};

const MAX_BP: i32 = 10_000;

// ============ Branches ============

#[derive(Debug, Clone, Serialize)]
pub struct BranchView {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<branch::Model> for BranchView {
    fn from(m: branch::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            name: m.name,
            address: m.address,
            phone: m.phone,
            active: m.active,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBranchRequest {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBranchRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

// ============ Doctors ============

#[derive(Debug, Clone, Serialize)]
pub struct DoctorView {
    pub id: i64,
    pub name: String,
    pub kind: DoctorKind,
    pub qualification: Option<String>,
    pub registration_no: Option<String>,
    pub phone: Option<String>,
    pub commission_bp: i32,
    pub consultation_share_bp: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl DoctorView {
    pub fn from_model(m: doctor::Model) -> Result<Self> {
        Ok(Self {
            kind: DoctorKind::parse(&m.kind)?,
            id: m.id,
            name: m.name,
            qualification: m.qualification,
            registration_no: m.registration_no,
            phone: m.phone,
            commission_bp: m.commission_bp,
            consultation_share_bp: m.consultation_share_bp,
            active: m.active,
            created_at: m.created_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub kind: DoctorKind,
    pub qualification: Option<String>,
    pub registration_no: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub commission_bp: i32,
    #[serde(default)]
    pub consultation_share_bp: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDoctorRequest {
    pub name: Option<String>,
    pub qualification: Option<String>,
    pub registration_no: Option<String>,
    pub phone: Option<String>,
    pub commission_bp: Option<i32>,
    pub consultation_share_bp: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorFilter {
    pub kind: Option<DoctorKind>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

// ============ Lab tests ============

#[derive(Debug, Clone, Serialize)]
pub struct LabTestView {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub unit: Option<String>,
    pub ref_low: Option<f64>,
    pub ref_high: Option<f64>,
    pub price: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<lab_test::Model> for LabTestView {
    fn from(m: lab_test::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            name: m.name,
            unit: m.unit,
            ref_low: m.ref_low,
            ref_high: m.ref_high,
            price: m.price,
            active: m.active,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLabTestRequest {
    pub code: String,
    pub name: String,
    pub unit: Option<String>,
    pub ref_low: Option<f64>,
    pub ref_high: Option<f64>,
    pub price: i64,
}

/// `ref_low`/`ref_high` use `Some(None)` to clear a bound
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLabTestRequest {
    pub name: Option<String>,
    pub unit: Option<String>,
    #[serde(default, with = "double_option")]
    pub ref_low: Option<Option<f64>>,
    #[serde(default, with = "double_option")]
    pub ref_high: Option<Option<f64>>,
    pub price: Option<i64>,
}

/// Distinguish a missing field from an explicit `null`
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogListQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LabdeskError::validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn normalize_code(code: &str) -> Result<String> {
    let code = required("code", code)?.to_uppercase();
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(LabdeskError::validation(format!(
            "Code '{}' may only contain letters, digits, '-' and '_'",
            code
        )));
    }
    Ok(code)
}

fn check_bp(field: &str, value: i32) -> Result<()> {
    if !(0..=MAX_BP).contains(&value) {
        return Err(LabdeskError::validation(format!(
            "{} must be between 0 and {} basis points, got {}",
            field, MAX_BP, value
        )));
    }
    Ok(())
}

fn check_ref_range(low: Option<f64>, high: Option<f64>) -> Result<()> {
    if let (Some(low), Some(high)) = (low, high)
        && low > high
    {
        return Err(LabdeskError::validation(format!(
            "Reference range low ({}) is above high ({})",
            low, high
        )));
    }
    Ok(())
}

fn check_price(price: i64) -> Result<()> {
    if price < 0 {
        return Err(LabdeskError::validation("price must not be negative"));
    }
    Ok(())
}

/// Load a branch or fail with `NotFound`
pub(crate) async fn load_branch<C: ConnectionTrait>(conn: &C, id: i64) -> Result<branch::Model> {
    BranchEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Branch {} not found", id)))
}

/// Load a doctor or fail with `NotFound`
pub(crate) async fn load_doctor<C: ConnectionTrait>(conn: &C, id: i64) -> Result<doctor::Model> {
    DoctorEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Doctor {} not found", id)))
}

/// Load a lab test or fail with `NotFound`
pub(crate) async fn load_lab_test<C: ConnectionTrait>(
    conn: &C,
    id: i64,
) -> Result<lab_test::Model> {
    LabTestEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Lab test {} not found", id)))
}

pub struct CatalogService {
    storage: Arc<SeaOrmStorage>,
    lab_tests: Cache<i64, LabTestView>,
}

impl CatalogService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let lab_tests = Cache::builder()
            .max_capacity(2_048)
            .time_to_live(Duration::from_secs(300))
            .build();
        Self { storage, lab_tests }
    }

    // ---------- branches ----------

    pub async fn create_branch(&self, req: CreateBranchRequest) -> Result<BranchView> {
        let code = normalize_code(&req.code)?;
        let name = required("name", &req.name)?;
        let db = self.storage.get_db();

        if BranchEntity::find()
            .filter(branch::Column::Code.eq(&code))
            .one(db)
            .await?
            .is_some()
        {
            return Err(LabdeskError::conflict(format!(
                "Branch code '{}' already exists",
                code
            )));
        }

        let model = branch::ActiveModel {
            code: Set(code),
            name: Set(name),
            address: Set(req.address),
            phone: Set(req.phone),
            active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!("Branch created: {} ({})", model.code, model.id);
        Ok(model.into())
    }

    pub async fn get_branch(&self, id: i64) -> Result<BranchView> {
        Ok(load_branch(self.storage.get_db(), id).await?.into())
    }

    pub async fn list_branches(&self, query: CatalogListQuery) -> Result<Paged<BranchView>> {
        let mut select = BranchEntity::find().order_by_asc(branch::Column::Code);
        if !query.include_inactive {
            select = select.filter(branch::Column::Active.eq(true));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let search = search.trim();
            select = select.filter(
                Condition::any()
                    .add(branch::Column::Code.contains(search.to_uppercase()))
                    .add(branch::Column::Name.contains(search)),
            );
        }
        let page = fetch_page(select, self.storage.get_db(), query.page, query.page_size).await?;
        Ok(page.map(BranchView::from))
    }

    pub async fn update_branch(&self, id: i64, req: UpdateBranchRequest) -> Result<BranchView> {
        let db = self.storage.get_db();
        let mut active = load_branch(db, id).await?.into_active_model();
        if let Some(name) = req.name {
            active.name = Set(required("name", &name)?);
        }
        if let Some(address) = req.address {
            active.address = Set(Some(address));
        }
        if let Some(phone) = req.phone {
            active.phone = Set(Some(phone));
        }
        let model = active.update(db).await?;
        info!("Branch updated: {}", model.code);
        Ok(model.into())
    }

    pub async fn deactivate_branch(&self, id: i64) -> Result<BranchView> {
        let db = self.storage.get_db();
        let mut active = load_branch(db, id).await?.into_active_model();
        active.active = Set(false);
        let model = active.update(db).await?;
        info!("Branch deactivated: {}", model.code);
        Ok(model.into())
    }

    // ---------- doctors ----------

    pub async fn create_doctor(&self, req: CreateDoctorRequest) -> Result<DoctorView> {
        let name = required("name", &req.name)?;
        check_bp("commission_bp", req.commission_bp)?;
        check_bp("consultation_share_bp", req.consultation_share_bp)?;

        let model = doctor::ActiveModel {
            name: Set(name),
            kind: Set(req.kind.to_string()),
            qualification: Set(req.qualification),
            registration_no: Set(req.registration_no),
            phone: Set(req.phone),
            commission_bp: Set(req.commission_bp),
            consultation_share_bp: Set(req.consultation_share_bp),
            active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;

        info!("Doctor created: {} ({}, {})", model.name, model.kind, model.id);
        DoctorView::from_model(model)
    }

    pub async fn get_doctor(&self, id: i64) -> Result<DoctorView> {
        DoctorView::from_model(load_doctor(self.storage.get_db(), id).await?)
    }

    pub async fn list_doctors(&self, filter: DoctorFilter) -> Result<Paged<DoctorView>> {
        let mut select = DoctorEntity::find().order_by_asc(doctor::Column::Name);
        if let Some(kind) = filter.kind {
            select = select.filter(doctor::Column::Kind.eq(kind.to_string()));
        }
        if !filter.include_inactive {
            select = select.filter(doctor::Column::Active.eq(true));
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(doctor::Column::Name.contains(search.trim()));
        }
        let page =
            fetch_page(select, self.storage.get_db(), filter.page, filter.page_size).await?;
        let total = page.total;
        let (p, size) = (page.page, page.page_size);
        let items = page
            .items
            .into_iter()
            .map(DoctorView::from_model)
            .collect::<Result<Vec<_>>>()?;
        Ok(Paged {
            items,
            total,
            page: p,
            page_size: size,
        })
    }

    pub async fn update_doctor(&self, id: i64, req: UpdateDoctorRequest) -> Result<DoctorView> {
        let db = self.storage.get_db();
        let mut active = load_doctor(db, id).await?.into_active_model();
        if let Some(name) = req.name {
            active.name = Set(required("name", &name)?);
        }
        if let Some(q) = req.qualification {
            active.qualification = Set(Some(q));
        }
        if let Some(r) = req.registration_no {
            active.registration_no = Set(Some(r));
        }
        if let Some(p) = req.phone {
            active.phone = Set(Some(p));
        }
        if let Some(bp) = req.commission_bp {
            check_bp("commission_bp", bp)?;
            active.commission_bp = Set(bp);
        }
        if let Some(bp) = req.consultation_share_bp {
            check_bp("consultation_share_bp", bp)?;
            active.consultation_share_bp = Set(bp);
        }
        let model = active.update(db).await?;
        info!("Doctor updated: {}", model.id);
        DoctorView::from_model(model)
    }

    pub async fn deactivate_doctor(&self, id: i64) -> Result<DoctorView> {
        let db = self.storage.get_db();
        let mut active = load_doctor(db, id).await?.into_active_model();
        active.active = Set(false);
        let model = active.update(db).await?;
        info!("Doctor deactivated: {}", model.id);
        DoctorView::from_model(model)
    }

    // ---------- lab tests ----------

    pub async fn create_lab_test(&self, req: CreateLabTestRequest) -> Result<LabTestView> {
        let code = normalize_code(&req.code)?;
        let name = required("name", &req.name)?;
        check_ref_range(req.ref_low, req.ref_high)?;
        check_price(req.price)?;
        let db = self.storage.get_db();

        if LabTestEntity::find()
            .filter(lab_test::Column::Code.eq(&code))
            .one(db)
            .await?
            .is_some()
        {
            return Err(LabdeskError::conflict(format!(
                "Lab test code '{}' already exists",
                code
            )));
        }

        let model = lab_test::ActiveModel {
            code: Set(code),
            name: Set(name),
            unit: Set(req.unit),
            ref_low: Set(req.ref_low),
            ref_high: Set(req.ref_high),
            price: Set(req.price),
            active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!("Lab test created: {} ({})", model.code, model.id);
        Ok(model.into())
    }

    /// Cached lookup; writes through this service invalidate the entry
    pub async fn get_lab_test(&self, id: i64) -> Result<LabTestView> {
        if let Some(view) = self.lab_tests.get(&id).await {
            debug!("Lab test cache hit: {}", id);
            return Ok(view);
        }
        let view: LabTestView = load_lab_test(self.storage.get_db(), id).await?.into();
        self.lab_tests.insert(id, view.clone()).await;
        Ok(view)
    }

    pub async fn list_lab_tests(&self, query: CatalogListQuery) -> Result<Paged<LabTestView>> {
        let mut select = LabTestEntity::find().order_by_asc(lab_test::Column::Code);
        if !query.include_inactive {
            select = select.filter(lab_test::Column::Active.eq(true));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let search = search.trim();
            select = select.filter(
                Condition::any()
                    .add(lab_test::Column::Code.contains(search.to_uppercase()))
                    .add(lab_test::Column::Name.contains(search)),
            );
        }
        let page = fetch_page(select, self.storage.get_db(), query.page, query.page_size).await?;
        Ok(page.map(LabTestView::from))
    }

    pub async fn update_lab_test(&self, id: i64, req: UpdateLabTestRequest) -> Result<LabTestView> {
        let db = self.storage.get_db();
        let current = load_lab_test(db, id).await?;

        let ref_low = req.ref_low.unwrap_or(current.ref_low);
        let ref_high = req.ref_high.unwrap_or(current.ref_high);
        check_ref_range(ref_low, ref_high)?;

        let mut active = current.into_active_model();
        if let Some(name) = req.name {
            active.name = Set(required("name", &name)?);
        }
        if let Some(unit) = req.unit {
            active.unit = Set(Some(unit));
        }
        if let Some(price) = req.price {
            check_price(price)?;
            active.price = Set(price);
        }
        active.ref_low = Set(ref_low);
        active.ref_high = Set(ref_high);

        let model = active.update(db).await?;
        self.lab_tests.invalidate(&id).await;
        info!("Lab test updated: {}", model.code);
        Ok(model.into())
    }

    pub async fn deactivate_lab_test(&self, id: i64) -> Result<LabTestView> {
        let db = self.storage.get_db();
        let mut active = load_lab_test(db, id).await?.into_active_model();
        active.active = Set(false);
        let model = active.update(db).await?;
        self.lab_tests.invalidate(&id).await;
        info!("Lab test deactivated: {}", model.code);
        Ok(model.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" main ").unwrap(), "MAIN");
        assert_eq!(normalize_code("cbc-01").unwrap(), "CBC-01");
        assert!(normalize_code("").is_err());
        assert!(normalize_code("a b").is_err());
    }

    #[test]
    fn test_check_bp_bounds() {
        assert!(check_bp("commission_bp", 0).is_ok());
        assert!(check_bp("commission_bp", 10_000).is_ok());
        assert!(check_bp("commission_bp", -1).is_err());
        assert!(check_bp("commission_bp", 10_001).is_err());
    }

    #[test]
    fn test_check_ref_range() {
        assert!(check_ref_range(Some(1.0), Some(2.0)).is_ok());
        assert!(check_ref_range(Some(2.0), Some(2.0)).is_ok());
        assert!(check_ref_range(None, Some(2.0)).is_ok());
        assert!(check_ref_range(Some(3.0), Some(2.0)).is_err());
    }

    #[test]
    fn test_update_lab_test_distinguishes_null_from_missing() {
        let req: UpdateLabTestRequest = serde_json::from_str(r#"{"ref_low": null}"#).unwrap();
        assert_eq!(req.ref_low, Some(None));
        assert_eq!(req.ref_high, None);
    }
}
