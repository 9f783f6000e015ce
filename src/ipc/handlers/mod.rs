pub mod backup_exchange;
pub mod balances;
pub mod classes;
pub mod core;
pub mod courses;
pub mod evaluations;
pub mod fees;
pub mod payments;
pub mod schedule;
pub mod settings;
pub mod students;
pub mod teachers;
