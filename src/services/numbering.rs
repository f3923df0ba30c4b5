//! Gapless sequential numbers
//!
//! Every number is allocated inside the caller's transaction, so a rolled
//! back registration or bill gives its number back. Each attempt runs in a
//! savepoint: PostgreSQL aborts the whole transaction on a refused `NOWAIT`
//! lock, and rolling back to the savepoint keeps the outer work alive.

use std::time::Duration;

use chrono::{Datelike, Utc};
use migration::entities::{NumberSequenceEntity, number_sequence};
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use tracing::{debug, trace, warn};

use crate::errors::{LabdeskError, Result};
use crate::storage::backend::retry::{calculate_backoff, is_contention_error};

/// Kinds of document numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Patient,
    Visit,
    Bill,
    Report,
}

impl NumberKind {
    pub fn prefix(self) -> &'static str {
        match self {
            NumberKind::Patient => "PAT",
            NumberKind::Visit => "VIS",
            NumberKind::Bill => "BIL",
            NumberKind::Report => "REP",
        }
    }

    /// Patient numbers run for the life of a branch; the rest restart each year
    pub fn resets_yearly(self) -> bool {
        !matches!(self, NumberKind::Patient)
    }
}

/// Row key in `number_sequences`
pub fn sequence_key(kind: NumberKind, branch_code: &str, year: i32) -> String {
    if kind.resets_yearly() {
        format!("{}:{}:{}", kind.prefix(), branch_code, year)
    } else {
        format!("{}:{}", kind.prefix(), branch_code)
    }
}

/// `PAT-MAIN-000042`, `BIL-MAIN-2026-000001`
pub fn format_number(kind: NumberKind, branch_code: &str, year: i32, value: i64) -> String {
    if kind.resets_yearly() {
        format!("{}-{}-{}-{:06}", kind.prefix(), branch_code, year, value)
    } else {
        format!("{}-{}-{:06}", kind.prefix(), branch_code, value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NumberGenerator {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl NumberGenerator {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn from_config() -> Self {
        let config = crate::config::get_config();
        Self::new(
            config.numbering.max_attempts,
            config.numbering.base_delay_ms,
            config.numbering.max_delay_ms,
        )
    }

    /// Allocate and format the next number of `kind` for a branch
    pub async fn next(
        &self,
        txn: &DatabaseTransaction,
        kind: NumberKind,
        branch_code: &str,
    ) -> Result<String> {
        let year = Utc::now().year();
        let key = sequence_key(kind, branch_code, year);
        let value = self.allocate(txn, &key).await?;
        Ok(format_number(kind, branch_code, year, value))
    }

    /// Allocate the next raw value for a sequence key
    pub async fn allocate(&self, txn: &DatabaseTransaction, key: &str) -> Result<i64> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::try_allocate(txn, key).await {
                Ok(Some(value)) => {
                    trace!("Sequence '{}' allocated {} on attempt {}", key, value, attempt);
                    return Ok(value);
                }
                Ok(None) => debug!("Sequence '{}' moved underneath us (attempt {})", key, attempt),
                Err(e) if is_contention_error(&e) => {
                    debug!("Sequence '{}' contended (attempt {}): {}", key, attempt, e)
                }
                Err(e) => return Err(e.into()),
            }

            if attempt >= self.max_attempts {
                warn!(
                    "Sequence '{}' still contended after {} attempts",
                    key, self.max_attempts
                );
                return Err(LabdeskError::sequence_contention(format!(
                    "Could not allocate a number for '{}' after {} attempts",
                    key, self.max_attempts
                )));
            }

            let delay = calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// One attempt inside a savepoint; `Ok(None)` is a lost compare-and-set
    async fn try_allocate(
        txn: &DatabaseTransaction,
        key: &str,
    ) -> std::result::Result<Option<i64>, DbErr> {
        let savepoint = txn.begin().await?;
        match Self::claim(&savepoint, key).await {
            Ok(Some(value)) => {
                savepoint.commit().await?;
                Ok(Some(value))
            }
            Ok(None) => {
                savepoint.rollback().await?;
                Ok(None)
            }
            Err(e) => {
                if let Err(rollback_err) = savepoint.rollback().await {
                    warn!("Failed to roll back sequence savepoint: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn claim(
        conn: &DatabaseTransaction,
        key: &str,
    ) -> std::result::Result<Option<i64>, DbErr> {
        let mut query = NumberSequenceEntity::find_by_id(key.to_string());
        // SQLite has one writer at a time and no row locks
        if conn.get_database_backend() != DatabaseBackend::Sqlite {
            query = query.lock_with_behavior(LockType::Update, LockBehavior::Nowait);
        }

        let now = Utc::now();
        match query.one(conn).await? {
            None => {
                let row = number_sequence::ActiveModel {
                    key: Set(key.to_string()),
                    next_value: Set(2),
                    updated_at: Set(now),
                };
                NumberSequenceEntity::insert(row)
                    .exec_without_returning(conn)
                    .await?;
                Ok(Some(1))
            }
            Some(row) => {
                let current = row.next_value;
                let result = NumberSequenceEntity::update_many()
                    .col_expr(number_sequence::Column::NextValue, Expr::value(current + 1))
                    .col_expr(number_sequence::Column::UpdatedAt, Expr::value(now))
                    .filter(number_sequence::Column::Key.eq(key))
                    .filter(number_sequence::Column::NextValue.eq(current))
                    .exec(conn)
                    .await?;
                if result.rows_affected == 1 {
                    Ok(Some(current))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_key_layout() {
        assert_eq!(sequence_key(NumberKind::Patient, "MAIN", 2026), "PAT:MAIN");
        assert_eq!(sequence_key(NumberKind::Bill, "MAIN", 2026), "BIL:MAIN:2026");
        assert_eq!(sequence_key(NumberKind::Report, "EAST", 2027), "REP:EAST:2027");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(
            format_number(NumberKind::Patient, "MAIN", 2026, 42),
            "PAT-MAIN-000042"
        );
        assert_eq!(
            format_number(NumberKind::Bill, "MAIN", 2026, 1),
            "BIL-MAIN-2026-000001"
        );
        assert_eq!(
            format_number(NumberKind::Visit, "MAIN", 2026, 1_234_567),
            "VIS-MAIN-2026-1234567"
        );
    }

    #[test]
    fn test_generator_needs_at_least_one_attempt() {
        let generator = NumberGenerator::new(0, 1, 1);
        assert_eq!(generator.max_attempts, 1);
    }
}
