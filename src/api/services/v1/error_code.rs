//! 统一 API 错误码定义

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::LabdeskError;

/// API 错误码枚举
///
/// 使用 serde_repr 序列化为数字。按千位分域：
/// - 0: 成功
/// - 1000-1099: 通用错误
/// - 2000-2099: 患者建档
/// - 3000-3099: 流水号
/// - 4000-4099: 报告
/// - 5000-5099: 医生结算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ErrorCode {
    // 成功
    Success = 0,

    // 通用错误 1000-1099
    BadRequest = 1000,
    Unauthorized = 1001,
    NotFound = 1004,
    InternalServerError = 1005,
    Conflict = 1009,
    InvalidDateFormat = 1012,
    PayloadTooLarge = 1013,
    ServiceUnavailable = 1030,

    // 患者建档 2000-2099
    DuplicatePatient = 2000,

    // 流水号 3000-3099
    SequenceContention = 3000,

    // 报告 4000-4099
    ReportFinalized = 4000,
    ReportIncomplete = 4001,

    // 医生结算 5000-5099
    LedgerPaid = 5000,
}

impl From<&LabdeskError> for ErrorCode {
    fn from(err: &LabdeskError) -> Self {
        match err {
            LabdeskError::Validation(_) => ErrorCode::BadRequest,
            LabdeskError::DateParse(_) => ErrorCode::InvalidDateFormat,
            LabdeskError::NotFound(_) => ErrorCode::NotFound,
            LabdeskError::Conflict(_) => ErrorCode::Conflict,
            LabdeskError::DuplicatePatient { .. } => ErrorCode::DuplicatePatient,
            LabdeskError::SequenceContention(_) => ErrorCode::SequenceContention,
            LabdeskError::ReportFinalized(_) => ErrorCode::ReportFinalized,
            LabdeskError::ReportIncomplete(_) => ErrorCode::ReportIncomplete,
            LabdeskError::LedgerPaid(_) => ErrorCode::LedgerPaid,
            LabdeskError::DatabaseConfig(_)
            | LabdeskError::DatabaseConnection(_)
            | LabdeskError::DatabaseOperation(_)
            | LabdeskError::FileOperation(_)
            | LabdeskError::Serialization(_) => ErrorCode::InternalServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_number() {
        assert_eq!(serde_json::to_string(&ErrorCode::Success).unwrap(), "0");
        assert_eq!(
            serde_json::to_string(&ErrorCode::DuplicatePatient).unwrap(),
            "2000"
        );
    }

    #[test]
    fn test_domain_errors_map_to_their_codes() {
        assert_eq!(
            ErrorCode::from(&LabdeskError::report_incomplete("x")),
            ErrorCode::ReportIncomplete
        );
        assert_eq!(
            ErrorCode::from(&LabdeskError::ledger_paid("x")),
            ErrorCode::LedgerPaid
        );
        assert_eq!(
            ErrorCode::from(&LabdeskError::database_operation("x")),
            ErrorCode::InternalServerError
        );
    }
}
