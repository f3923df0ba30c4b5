use std::fmt;

use actix_web::http::StatusCode;
use sea_orm::SqlErr;

use crate::services::matching::DuplicateCandidate;

#[derive(Debug, Clone)]
pub enum LabdeskError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    FileOperation(String),
    Validation(String),
    NotFound(String),
    Conflict(String),
    Serialization(String),
    DateParse(String),
    DuplicatePatient {
        message: String,
        candidates: Vec<DuplicateCandidate>,
    },
    SequenceContention(String),
    ReportFinalized(String),
    ReportIncomplete(String),
    LedgerPaid(String),
}

impl LabdeskError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            LabdeskError::DatabaseConfig(_) => "E001",
            LabdeskError::DatabaseConnection(_) => "E002",
            LabdeskError::DatabaseOperation(_) => "E003",
            LabdeskError::FileOperation(_) => "E004",
            LabdeskError::Validation(_) => "E005",
            LabdeskError::NotFound(_) => "E006",
            LabdeskError::Conflict(_) => "E007",
            LabdeskError::Serialization(_) => "E008",
            LabdeskError::DateParse(_) => "E009",
            LabdeskError::DuplicatePatient { .. } => "E010",
            LabdeskError::SequenceContention(_) => "E011",
            LabdeskError::ReportFinalized(_) => "E012",
            LabdeskError::ReportIncomplete(_) => "E013",
            LabdeskError::LedgerPaid(_) => "E014",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            LabdeskError::DatabaseConfig(_) => "Database Configuration Error",
            LabdeskError::DatabaseConnection(_) => "Database Connection Error",
            LabdeskError::DatabaseOperation(_) => "Database Operation Error",
            LabdeskError::FileOperation(_) => "File Operation Error",
            LabdeskError::Validation(_) => "Validation Error",
            LabdeskError::NotFound(_) => "Resource Not Found",
            LabdeskError::Conflict(_) => "Conflict",
            LabdeskError::Serialization(_) => "Serialization Error",
            LabdeskError::DateParse(_) => "Date Parse Error",
            LabdeskError::DuplicatePatient { .. } => "Duplicate Patient",
            LabdeskError::SequenceContention(_) => "Sequence Contention",
            LabdeskError::ReportFinalized(_) => "Report Finalized",
            LabdeskError::ReportIncomplete(_) => "Report Incomplete",
            LabdeskError::LedgerPaid(_) => "Payout Ledger Paid",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            LabdeskError::DatabaseConfig(msg)
            | LabdeskError::DatabaseConnection(msg)
            | LabdeskError::DatabaseOperation(msg)
            | LabdeskError::FileOperation(msg)
            | LabdeskError::Validation(msg)
            | LabdeskError::NotFound(msg)
            | LabdeskError::Conflict(msg)
            | LabdeskError::Serialization(msg)
            | LabdeskError::DateParse(msg)
            | LabdeskError::SequenceContention(msg)
            | LabdeskError::ReportFinalized(msg)
            | LabdeskError::ReportIncomplete(msg)
            | LabdeskError::LedgerPaid(msg) => msg,
            LabdeskError::DuplicatePatient { message, .. } => message,
        }
    }

    /// HTTP status the API answers with for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            LabdeskError::Validation(_) | LabdeskError::DateParse(_) => StatusCode::BAD_REQUEST,
            LabdeskError::NotFound(_) => StatusCode::NOT_FOUND,
            LabdeskError::Conflict(_)
            | LabdeskError::DuplicatePatient { .. }
            | LabdeskError::ReportFinalized(_)
            | LabdeskError::LedgerPaid(_) => StatusCode::CONFLICT,
            LabdeskError::ReportIncomplete(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LabdeskError::SequenceContention(_) => StatusCode::SERVICE_UNAVAILABLE,
            LabdeskError::DatabaseConfig(_)
            | LabdeskError::DatabaseConnection(_)
            | LabdeskError::DatabaseOperation(_)
            | LabdeskError::FileOperation(_)
            | LabdeskError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 格式化为彩色输出（命令行启动失败时使用）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for LabdeskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for LabdeskError {}

// 便捷的构造函数
impl LabdeskError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        LabdeskError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        LabdeskError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        LabdeskError::DatabaseOperation(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        LabdeskError::FileOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        LabdeskError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        LabdeskError::NotFound(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        LabdeskError::Conflict(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        LabdeskError::Serialization(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        LabdeskError::DateParse(msg.into())
    }

    pub fn duplicate_patient<T: Into<String>>(msg: T, candidates: Vec<DuplicateCandidate>) -> Self {
        LabdeskError::DuplicatePatient {
            message: msg.into(),
            candidates,
        }
    }

    pub fn sequence_contention<T: Into<String>>(msg: T) -> Self {
        LabdeskError::SequenceContention(msg.into())
    }

    pub fn report_finalized<T: Into<String>>(msg: T) -> Self {
        LabdeskError::ReportFinalized(msg.into())
    }

    pub fn report_incomplete<T: Into<String>>(msg: T) -> Self {
        LabdeskError::ReportIncomplete(msg.into())
    }

    pub fn ledger_paid<T: Into<String>>(msg: T) -> Self {
        LabdeskError::LedgerPaid(msg.into())
    }

    /// Duplicate candidates attached to a `DuplicatePatient` error
    pub fn candidates(&self) -> Option<&[DuplicateCandidate]> {
        match self {
            LabdeskError::DuplicatePatient { candidates, .. } => Some(candidates),
            _ => None,
        }
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for LabdeskError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                LabdeskError::Conflict(format!("Unique constraint violated: {}", detail))
            }
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => LabdeskError::Validation(
                format!("Referenced row does not exist: {}", detail),
            ),
            _ => LabdeskError::DatabaseOperation(err.to_string()),
        }
    }
}

impl From<std::io::Error> for LabdeskError {
    fn from(err: std::io::Error) -> Self {
        LabdeskError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for LabdeskError {
    fn from(err: serde_json::Error) -> Self {
        LabdeskError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for LabdeskError {
    fn from(err: chrono::ParseError) -> Self {
        LabdeskError::DateParse(err.to_string())
    }
}

impl From<csv::Error> for LabdeskError {
    fn from(err: csv::Error) -> Self {
        LabdeskError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LabdeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            LabdeskError::validation("bad").http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LabdeskError::report_finalized("locked").http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LabdeskError::report_incomplete("missing").http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LabdeskError::sequence_contention("busy").http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_duplicate_patient_carries_candidates() {
        let err = LabdeskError::duplicate_patient("likely duplicate", Vec::new());
        assert_eq!(err.code(), "E010");
        assert_eq!(err.message(), "likely duplicate");
        assert_eq!(err.candidates().map(|c| c.len()), Some(0));
        assert!(LabdeskError::not_found("x").candidates().is_none());
    }

    #[test]
    fn test_db_record_not_found_maps_to_operation_error() {
        let err: LabdeskError = sea_orm::DbErr::RecordNotFound("gone".to_string()).into();
        assert!(matches!(err, LabdeskError::DatabaseOperation(_)));
    }

    #[test]
    fn test_format_simple() {
        let err = LabdeskError::ledger_paid("ledger 4 is paid");
        assert_eq!(err.format_simple(), "Payout Ledger Paid: ledger 4 is paid");
        assert_eq!(err.to_string(), err.format_simple());
    }
}
