pub mod announcement;
pub mod problem;
pub mod record;
pub mod role;
pub mod store;
pub mod task;
pub mod user;
mod wire;

pub use wire::{RecordId, set_sheet_time_zone};
