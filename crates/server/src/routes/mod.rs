pub mod auth;
pub mod schedules;
pub mod users;
