pub mod checkin;
pub mod completion;
pub mod config;
pub mod dashboard;
pub mod database_validator;
pub mod file_storage;
pub mod notes;
pub mod notes_board;
pub mod period_window;
pub mod query_cache;
pub mod realtime;
pub mod routine_period;
pub mod routine_scheduler;
pub mod task_rollup;
pub mod validation;
