//! Service layer - migration orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod authoring;
mod doctor;
pub mod ledger;
pub mod logging;
pub mod runner;
pub mod store;

pub use authoring::create_migration;
pub use doctor::{CheckResult, CheckStatus, DoctorResult, DoctorService, DoctorSummary};
pub use ledger::Ledger;
pub use logging::{EventCount, LogEntry, LogEvent, LoggingService};
pub use runner::{
    MigrateResult, MigrationRef, MigrationRunner, RollbackResult, RunEvent, StatusReport,
};
pub use store::{MigrationStore, StoreSurvey};
