pub mod activities;
pub mod budgets;
pub mod import_csv;
pub mod recovery_types;
pub mod school_years;
pub mod teachers;
