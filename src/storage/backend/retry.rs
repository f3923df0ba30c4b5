//! 数据库错误分类与重试
//!
//! Two families of failures are told apart here:
//! - transient errors (dropped connections, deadlocks, SQLite BUSY) that are
//!   safe to retry for idempotent reads through [`with_retry`]
//! - row contention (`NOWAIT` lock refusals, unique violations on a racing
//!   insert) that the number generator retries inside its savepoint loop

use sea_orm::{DbErr, SqlErr};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// 判断数据库错误是否可重试
pub fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(runtime_err) | DbErr::Query(runtime_err) => {
            runtime_error_code(runtime_err).is_some_and(|code| {
                matches!(
                    code.as_str(),
                    // MySQL 死锁和锁超时
                    "1213" | "1205" |
                    // PostgreSQL 序列化失败和死锁
                    "40001" | "40P01" |
                    // SQLite BUSY 和 LOCKED
                    "5" | "6"
                )
            }) || is_retryable_error_message(&runtime_err.to_string().to_lowercase())
        }
        _ => false,
    }
}

/// Whether the error means another transaction holds the row we want
///
/// Covers PostgreSQL `55P03` (lock_not_available), MySQL `3572`
/// (ER_LOCK_NOWAIT), unique violations from two inserts racing on a new
/// sequence key, and every transient error from [`is_retryable_error`].
pub fn is_contention_error(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    if let DbErr::Exec(runtime_err) | DbErr::Query(runtime_err) = err {
        if runtime_error_code(runtime_err).is_some_and(|code| code == "55P03" || code == "3572")
        {
            return true;
        }
        let message = runtime_err.to_string().to_lowercase();
        if message.contains("could not obtain lock") || message.contains("nowait is set") {
            return true;
        }
    }
    is_retryable_error(err)
}

/// 提取底层数据库错误码
fn runtime_error_code(err: &sea_orm::error::RuntimeErr) -> Option<String> {
    use sea_orm::error::RuntimeErr;

    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            use std::ops::Deref;
            sqlx_err
                .deref()
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .map(|code| code.into_owned())
        }
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// 通过错误消息判断是否可重试（回退方案）
fn is_retryable_error_message(err_str: &str) -> bool {
    err_str.contains("deadlock")
        || err_str.contains("lock wait timeout")
        || err_str.contains("database is locked")
        || err_str.contains("serialization failure")
}

/// 重试配置
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// 指数退避重试执行器
///
/// Only for operations that are safe to run twice. Writes that allocate
/// numbers go through their own transaction instead.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "Operation '{}' succeeded after {} retries",
                        operation_name, attempt
                    );
                }
                return Ok(result);
            }
            Err(e) if is_retryable_error(&e) && attempt < config.max_retries => {
                attempt += 1;
                let delay = calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms);
                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}; retrying in {} ms",
                    operation_name,
                    attempt,
                    config.max_retries + 1,
                    e,
                    delay
                );
                sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                if !is_retryable_error(&e) {
                    debug!(
                        "Operation '{}' failed with non-retryable error: {}",
                        operation_name, e
                    );
                }
                return Err(e);
            }
        }
    }
}

/// 计算指数退避延迟（带 0-25% 抖动）
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    use rand::RngExt;
    let exp_delay = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = exp_delay.min(max_ms);
    let jitter = rand::rng().random_range(0..=capped / 4);
    capped.saturating_add(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::error::RuntimeErr;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_is_retryable_error_connection_acquire() {
        let err = DbErr::ConnectionAcquire(sea_orm::error::ConnAcquireErr::Timeout);
        assert!(is_retryable_error(&err));
    }

    #[test]
    fn test_is_retryable_error_record_not_found() {
        let err = DbErr::RecordNotFound("not found".to_string());
        assert!(!is_retryable_error(&err));
        assert!(!is_contention_error(&err));
    }

    #[test]
    fn test_is_retryable_error_database_locked() {
        let err = DbErr::Query(RuntimeErr::Internal("database is locked".to_string()));
        assert!(is_retryable_error(&err));
        assert!(is_contention_error(&err));
    }

    #[test]
    fn test_is_contention_error_nowait_message() {
        let pg = DbErr::Query(RuntimeErr::Internal(
            "could not obtain lock on row in relation \"number_sequences\"".to_string(),
        ));
        assert!(is_contention_error(&pg));
        assert!(!is_retryable_error(&pg));

        let mysql = DbErr::Query(RuntimeErr::Internal(
            "Statement aborted because lock(s) could not be acquired immediately and NOWAIT is set"
                .to_string(),
        ));
        assert!(is_contention_error(&mysql));
    }

    #[test]
    fn test_is_contention_error_ignores_plain_failures() {
        let err = DbErr::Exec(RuntimeErr::Internal("syntax error near SELECT".to_string()));
        assert!(!is_contention_error(&err));
    }

    #[test]
    fn test_calculate_backoff_exponential() {
        let delay1 = calculate_backoff(1, 100, 2000);
        assert!((100..=125).contains(&delay1));

        let delay3 = calculate_backoff(3, 100, 2000);
        assert!((400..=500).contains(&delay3));
    }

    #[test]
    fn test_calculate_backoff_capped_at_max() {
        let delay = calculate_backoff(10, 100, 2000);
        assert!((2000..=2500).contains(&delay));
    }

    #[tokio::test]
    async fn test_with_retry_success_after_retries() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 5,
            max_delay_ms: 20,
        };
        let call_count = AtomicU32::new(0);

        let result = with_retry("test_op", config, || {
            let count = call_count.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(DbErr::ConnectionAcquire(
                        sea_orm::error::ConnAcquireErr::Timeout,
                    ))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_error_no_retry() {
        let config = RetryConfig::default();
        let call_count = AtomicU32::new(0);

        let result = with_retry("test_op", config, || {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(DbErr::RecordNotFound("not found".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
