//! Postgres-backed repositories. Queries are checked at runtime so the crate
//! builds without a live database.

pub mod assignment;
pub mod availability;
pub mod parameters;
pub mod replacement;

pub use assignment::PgAssignmentRepository;
pub use availability::PgAvailabilityRepository;
pub use parameters::PgParametersRepository;
pub use replacement::PgReplacementRepository;
