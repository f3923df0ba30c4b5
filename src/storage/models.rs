//! Status and kind enums stored as upper-case strings
//!
//! Entities keep these columns as `String`; the enums here are the only
//! place the allowed values are spelled out.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::{LabdeskError, Result};

macro_rules! stored_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
            Display, EnumString, AsRefStr, EnumIter,
        )]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        #[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Parse a stored column value
            pub fn parse(value: &str) -> Result<Self> {
                value.parse().map_err(|_| {
                    LabdeskError::database_operation(format!(
                        "Unexpected {} value in database: '{}'",
                        stringify!($name),
                        value
                    ))
                })
            }
        }
    };
}

stored_enum!(
    /// REFERRAL doctors send patients, CLINIC doctors consult, PATHOLOGISTs sign reports
    DoctorKind { Referral, Clinic, Pathologist }
);

stored_enum!(VisitDomain { Diagnostics, Clinic });

stored_enum!(VisitStatus { Open, Completed, Cancelled });

stored_enum!(BillStatus { Unpaid, Partial, Paid, Cancelled });

stored_enum!(OrderStatus { Ordered, Resulted, Cancelled });

stored_enum!(ResultFlag { Normal, Low, High, Abnormal });

stored_enum!(ReportStatus { Draft, Finalized });

stored_enum!(PayoutBasis { Referral, Clinic });

stored_enum!(LedgerStatus { Pending, Paid });

impl BillStatus {
    /// Status implied by how much of the net amount has been paid
    pub fn for_amounts(paid: i64, net: i64) -> Self {
        if paid >= net {
            BillStatus::Paid
        } else if paid > 0 {
            BillStatus::Partial
        } else {
            BillStatus::Unpaid
        }
    }
}

impl ResultFlag {
    pub fn is_abnormal(self) -> bool {
        !matches!(self, ResultFlag::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_column_text() {
        assert_eq!(VisitDomain::Diagnostics.to_string(), "DIAGNOSTICS");
        assert_eq!(
            VisitDomain::parse("DIAGNOSTICS").unwrap(),
            VisitDomain::Diagnostics
        );
        assert_eq!(DoctorKind::parse("pathologist").unwrap(), DoctorKind::Pathologist);
        assert!(ReportStatus::parse("ARCHIVED").is_err());
    }

    #[test]
    fn test_serde_uses_upper_case() {
        let json = serde_json::to_string(&LedgerStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
        let basis: PayoutBasis = serde_json::from_str("\"CLINIC\"").unwrap();
        assert_eq!(basis, PayoutBasis::Clinic);
    }

    #[test]
    fn test_bill_status_for_amounts() {
        assert_eq!(BillStatus::for_amounts(0, 500), BillStatus::Unpaid);
        assert_eq!(BillStatus::for_amounts(200, 500), BillStatus::Partial);
        assert_eq!(BillStatus::for_amounts(500, 500), BillStatus::Paid);
        assert_eq!(BillStatus::for_amounts(0, 0), BillStatus::Paid);
    }
}
