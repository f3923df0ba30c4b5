//! Patient registration and identity
//!
//! Creation for one phone number is serialized: first an in-process keyed
//! mutex, then (on PostgreSQL) a transaction-scoped advisory lock. Under the
//! lock the duplicate check and the insert see the same data, so two front
//! desks submitting the same patient end up with one record.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use migration::entities::{PatientEntity, PatientIdentifierEntity, patient, patient_identifier};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseTransaction, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::catalog_service::load_branch;
use super::matching::{
    DuplicateCandidate, MatchKeys, MatchStrength, match_candidate, normalize_name,
    normalize_phone,
};
use super::numbering::{NumberGenerator, NumberKind};
use super::{Paged, fetch_page};
use crate::errors::{LabdeskError, Result};
use crate::storage::SeaOrmStorage;
use crate::storage::locks::{KeyedLocks, acquire_advisory_xact_lock, advisory_key};

const MIN_PHONE_DIGITS: usize = 7;

// ============ Request/Response DTOs ============

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifierInput {
    /// e.g. `AADHAAR`, `PASSPORT`, `MRN`
    pub id_type: String,
    pub value: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePatientRequest {
    pub branch_id: i64,
    pub full_name: String,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<IdentifierInput>,
    /// Register even when a probable duplicate exists
    #[serde(default)]
    pub allow_duplicate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DuplicateCheckRequest {
    pub full_name: String,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePatientRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientFilter {
    /// Name, phone or patient number
    pub search: Option<String>,
    pub branch_id: Option<i64>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifierView {
    pub id: i64,
    pub id_type: String,
    pub value: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl From<patient_identifier::Model> for IdentifierView {
    fn from(m: patient_identifier::Model) -> Self {
        Self {
            id: m.id,
            id_type: m.id_type,
            value: m.value,
            is_primary: m.is_primary,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientView {
    pub id: i64,
    pub patient_number: String,
    pub branch_id: i64,
    pub full_name: String,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<IdentifierView>>,
}

impl From<patient::Model> for PatientView {
    fn from(m: patient::Model) -> Self {
        Self {
            id: m.id,
            patient_number: m.patient_number,
            branch_id: m.branch_id,
            full_name: m.full_name,
            phone: m.phone,
            date_of_birth: m.date_of_birth,
            sex: m.sex,
            address: m.address,
            created_at: m.created_at,
            updated_at: m.updated_at,
            identifiers: None,
        }
    }
}

/// Result of a registration attempt
#[derive(Debug, Clone, Serialize)]
pub struct CreatePatientOutcome {
    pub patient: PatientView,
    /// False when an exact match already existed and was returned instead
    pub created: bool,
}

fn validated_keys(full_name: &str, phone: &str) -> Result<(String, String)> {
    let name_key = normalize_name(full_name);
    if name_key.is_empty() {
        return Err(LabdeskError::validation("full_name must not be empty"));
    }
    let phone_key = normalize_phone(phone);
    if phone_key.len() < MIN_PHONE_DIGITS {
        return Err(LabdeskError::validation(format!(
            "phone must contain at least {} digits",
            MIN_PHONE_DIGITS
        )));
    }
    Ok((name_key, phone_key))
}

fn normalize_id_type(id_type: &str) -> Result<String> {
    let id_type = id_type.trim().to_uppercase();
    if id_type.is_empty() {
        return Err(LabdeskError::validation("id_type must not be empty"));
    }
    Ok(id_type)
}

/// Ranked candidates for an incoming record, strongest first
///
/// Every row sharing the phone key is loaded: those decide Exact matches.
/// Namesakes on other phones are capped at `limit`.
async fn collect_candidates<C: ConnectionTrait>(
    conn: &C,
    phone_key: &str,
    name_key: &str,
    date_of_birth: Option<NaiveDate>,
    threshold: f64,
    limit: u64,
) -> Result<Vec<(DuplicateCandidate, patient::Model)>> {
    let mut rows = PatientEntity::find()
        .filter(patient::Column::PhoneKey.eq(phone_key))
        .order_by_asc(patient::Column::Id)
        .all(conn)
        .await?;
    let namesakes = PatientEntity::find()
        .filter(patient::Column::NameKey.eq(name_key))
        .filter(patient::Column::PhoneKey.ne(phone_key))
        .order_by_asc(patient::Column::Id)
        .limit(limit)
        .all(conn)
        .await?;
    rows.extend(namesakes);

    let incoming = MatchKeys {
        phone_key,
        name_key,
        date_of_birth,
    };
    let mut ranked: Vec<(DuplicateCandidate, patient::Model)> = rows
        .into_iter()
        .filter_map(|row| {
            let existing = MatchKeys {
                phone_key: &row.phone_key,
                name_key: &row.name_key,
                date_of_birth: row.date_of_birth,
            };
            let strength = match_candidate(&incoming, &existing, threshold)?;
            let candidate = DuplicateCandidate {
                patient_id: row.id,
                patient_number: row.patient_number.clone(),
                full_name: row.full_name.clone(),
                phone: row.phone.clone(),
                date_of_birth: row.date_of_birth,
                strength,
            };
            Some((candidate, row))
        })
        .collect();
    ranked.sort_by(|a, b| b.0.strength.cmp(&a.0.strength));
    Ok(ranked)
}

/// Clear the current primary of `id_type` for a patient
async fn demote_primary(txn: &DatabaseTransaction, patient_id: i64, id_type: &str) -> Result<()> {
    PatientIdentifierEntity::update_many()
        .col_expr(patient_identifier::Column::IsPrimary, Expr::value(false))
        .filter(patient_identifier::Column::PatientId.eq(patient_id))
        .filter(patient_identifier::Column::IdType.eq(id_type))
        .filter(patient_identifier::Column::IsPrimary.eq(true))
        .exec(txn)
        .await?;
    Ok(())
}

async fn insert_identifier(
    txn: &DatabaseTransaction,
    patient_id: i64,
    input: &IdentifierInput,
) -> Result<patient_identifier::Model> {
    let id_type = normalize_id_type(&input.id_type)?;
    let value = input.value.trim();
    if value.is_empty() {
        return Err(LabdeskError::validation("identifier value must not be empty"));
    }
    if input.is_primary {
        demote_primary(txn, patient_id, &id_type).await?;
    }
    let model = patient_identifier::ActiveModel {
        patient_id: Set(patient_id),
        id_type: Set(id_type),
        value: Set(value.to_string()),
        is_primary: Set(input.is_primary),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(txn)
    .await?;
    Ok(model)
}

async fn load_patient<C: ConnectionTrait>(conn: &C, id: i64) -> Result<patient::Model> {
    PatientEntity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| LabdeskError::not_found(format!("Patient {} not found", id)))
}

// ============ PatientService Implementation ============

pub struct PatientService {
    storage: Arc<SeaOrmStorage>,
    numbers: NumberGenerator,
    locks: KeyedLocks,
}

impl PatientService {
    pub fn new(storage: Arc<SeaOrmStorage>, numbers: NumberGenerator) -> Self {
        Self {
            storage,
            numbers,
            locks: KeyedLocks::new(),
        }
    }

    /// Register a patient unless the same person is already on file
    pub async fn create_patient(&self, req: CreatePatientRequest) -> Result<CreatePatientOutcome> {
        let (name_key, phone_key) = validated_keys(&req.full_name, &req.phone)?;
        let config = crate::config::get_config();
        let lock_key = advisory_key(&config.patients.advisory_lock_namespace, &phone_key);

        let _guard = self.locks.lock(lock_key).await;
        let txn = self.storage.get_db().begin().await?;
        if self.storage.is_postgres() {
            acquire_advisory_xact_lock(&txn, lock_key).await?;
        }

        let branch = load_branch(&txn, req.branch_id).await?;
        if !branch.active {
            return Err(LabdeskError::validation(format!(
                "Branch {} is inactive",
                branch.code
            )));
        }

        let ranked = collect_candidates(
            &txn,
            &phone_key,
            &name_key,
            req.date_of_birth,
            config.patients.probable_threshold,
            config.patients.max_candidates,
        )
        .await?;

        if let Some((candidate, existing)) = ranked.first()
            && candidate.strength == MatchStrength::Exact
        {
            info!(
                "Patient registration matched existing {} exactly",
                existing.patient_number
            );
            txn.rollback().await?;
            return Ok(CreatePatientOutcome {
                patient: existing.clone().into(),
                created: false,
            });
        }

        if !req.allow_duplicate
            && ranked
                .iter()
                .any(|(c, _)| c.strength == MatchStrength::Probable)
        {
            let candidates: Vec<DuplicateCandidate> = ranked.into_iter().map(|(c, _)| c).collect();
            warn!(
                "Patient registration refused: {} probable duplicate(s) for phone {}",
                candidates
                    .iter()
                    .filter(|c| c.strength == MatchStrength::Probable)
                    .count(),
                phone_key
            );
            return Err(LabdeskError::duplicate_patient(
                "A patient with matching details already exists",
                candidates,
            ));
        }

        let patient_number = self
            .numbers
            .next(&txn, NumberKind::Patient, &branch.code)
            .await?;
        let now = Utc::now();
        let model = patient::ActiveModel {
            patient_number: Set(patient_number),
            branch_id: Set(branch.id),
            full_name: Set(req.full_name.trim().to_string()),
            name_key: Set(name_key),
            phone: Set(req.phone.trim().to_string()),
            phone_key: Set(phone_key),
            date_of_birth: Set(req.date_of_birth),
            sex: Set(req.sex),
            address: Set(req.address),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut identifiers = Vec::with_capacity(req.identifiers.len());
        for input in &req.identifiers {
            identifiers.push(insert_identifier(&txn, model.id, input).await?);
        }
        // a later primary in the same request demoted the earlier one
        let identifiers = if identifiers.is_empty() {
            identifiers
        } else {
            PatientIdentifierEntity::find()
                .filter(patient_identifier::Column::PatientId.eq(model.id))
                .order_by_asc(patient_identifier::Column::Id)
                .all(&txn)
                .await?
        };

        txn.commit().await?;
        info!("Patient registered: {} ({})", model.patient_number, model.id);

        let mut view: PatientView = model.into();
        view.identifiers = Some(identifiers.into_iter().map(Into::into).collect());
        Ok(CreatePatientOutcome {
            patient: view,
            created: true,
        })
    }

    /// Matching without registering anything
    pub async fn find_duplicates(
        &self,
        req: DuplicateCheckRequest,
    ) -> Result<Vec<DuplicateCandidate>> {
        let (name_key, phone_key) = validated_keys(&req.full_name, &req.phone)?;
        let config = crate::config::get_config();
        let ranked = collect_candidates(
            self.storage.get_db(),
            &phone_key,
            &name_key,
            req.date_of_birth,
            config.patients.probable_threshold,
            config.patients.max_candidates,
        )
        .await?;
        debug!("Duplicate check found {} candidate(s)", ranked.len());
        Ok(ranked.into_iter().map(|(c, _)| c).collect())
    }

    pub async fn get_patient(&self, id: i64) -> Result<PatientView> {
        let db = self.storage.get_db();
        let model = load_patient(db, id).await?;
        let identifiers = self.identifiers_of(db, id).await?;
        let mut view: PatientView = model.into();
        view.identifiers = Some(identifiers);
        Ok(view)
    }

    pub async fn list_patients(&self, filter: PatientFilter) -> Result<Paged<PatientView>> {
        let mut select = PatientEntity::find().order_by_desc(patient::Column::Id);
        if let Some(branch_id) = filter.branch_id {
            select = select.filter(patient::Column::BranchId.eq(branch_id));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let mut any = Condition::any()
                .add(patient::Column::PatientNumber.contains(search.to_uppercase()));
            let name = normalize_name(search);
            if !name.is_empty() {
                any = any.add(patient::Column::NameKey.contains(name));
            }
            let digits = normalize_phone(search);
            if digits.len() >= 3 {
                any = any.add(patient::Column::PhoneKey.contains(digits));
            }
            select = select.filter(any);
        }
        let page = fetch_page(select, self.storage.get_db(), filter.page, filter.page_size).await?;
        Ok(page.map(PatientView::from))
    }

    /// Update demographics; name and phone changes recompute the match keys
    pub async fn update_patient(&self, id: i64, req: UpdatePatientRequest) -> Result<PatientView> {
        let txn = self.storage.get_db().begin().await?;
        let current = load_patient(&txn, id).await?;

        let full_name = req.full_name.unwrap_or_else(|| current.full_name.clone());
        let phone = req.phone.unwrap_or_else(|| current.phone.clone());
        let (name_key, phone_key) = validated_keys(&full_name, &phone)?;

        let mut active = current.into_active_model();
        active.full_name = Set(full_name.trim().to_string());
        active.name_key = Set(name_key);
        active.phone = Set(phone.trim().to_string());
        active.phone_key = Set(phone_key);
        if let Some(dob) = req.date_of_birth {
            active.date_of_birth = Set(Some(dob));
        }
        if let Some(sex) = req.sex {
            active.sex = Set(Some(sex));
        }
        if let Some(address) = req.address {
            active.address = Set(Some(address));
        }
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        txn.commit().await?;

        info!("Patient updated: {}", model.patient_number);
        Ok(model.into())
    }

    /// Attach an identifier; a new primary demotes the old one of that type
    pub async fn add_identifier(
        &self,
        patient_id: i64,
        input: IdentifierInput,
    ) -> Result<IdentifierView> {
        let txn = self.storage.get_db().begin().await?;
        load_patient(&txn, patient_id).await?;
        let model = insert_identifier(&txn, patient_id, &input).await?;
        txn.commit().await?;
        info!(
            "Identifier {} added to patient {} (primary: {})",
            model.id_type, patient_id, model.is_primary
        );
        Ok(model.into())
    }

    pub async fn set_primary_identifier(
        &self,
        patient_id: i64,
        identifier_id: i64,
    ) -> Result<IdentifierView> {
        let txn = self.storage.get_db().begin().await?;
        let identifier = PatientIdentifierEntity::find_by_id(identifier_id)
            .filter(patient_identifier::Column::PatientId.eq(patient_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                LabdeskError::not_found(format!(
                    "Identifier {} not found for patient {}",
                    identifier_id, patient_id
                ))
            })?;

        demote_primary(&txn, patient_id, &identifier.id_type).await?;
        let mut active = identifier.into_active_model();
        active.is_primary = Set(true);
        let model = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            "Identifier {} is now primary {} for patient {}",
            model.id, model.id_type, patient_id
        );
        Ok(model.into())
    }

    pub async fn list_identifiers(&self, patient_id: i64) -> Result<Vec<IdentifierView>> {
        let db = self.storage.get_db();
        load_patient(db, patient_id).await?;
        self.identifiers_of(db, patient_id).await
    }

    async fn identifiers_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        patient_id: i64,
    ) -> Result<Vec<IdentifierView>> {
        Ok(PatientIdentifierEntity::find()
            .filter(patient_identifier::Column::PatientId.eq(patient_id))
            .order_by_asc(patient_identifier::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }
}
