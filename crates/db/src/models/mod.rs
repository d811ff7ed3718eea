pub mod note;
pub mod note_attachment;
pub mod routine;
pub mod routine_checkin;
pub mod routine_period;
pub mod sector;
pub mod task;
pub mod unit;
