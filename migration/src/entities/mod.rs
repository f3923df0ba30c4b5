pub mod bill;
pub mod bill_item;
pub mod branch;
pub mod doctor;
pub mod doctor_payout_ledger;
pub mod number_sequence;
pub mod patient;
pub mod patient_identifier;
pub mod report_version;
pub mod test_order;
pub mod test_result;
pub mod visit;

pub use bill::Entity as BillEntity;
pub use bill_item::Entity as BillItemEntity;
pub use branch::Entity as BranchEntity;
pub use doctor::Entity as DoctorEntity;
pub use doctor_payout_ledger::Entity as DoctorPayoutLedgerEntity;
pub use lab_test::Entity as LabTestEntity;
pub use number_sequence::Entity as NumberSequenceEntity;
pub use patient::Entity as PatientEntity;
pub use patient_identifier::Entity as PatientIdentifierEntity;
pub use report_version::Entity as ReportVersionEntity;
pub use test_order::Entity as TestOrderEntity;
pub use test_result::Entity as TestResultEntity;
pub use visit::Entity as VisitEntity;
