pub mod discovery;
pub mod rating;
pub mod uploads;
