pub mod application;
pub mod approval;
pub mod user;
