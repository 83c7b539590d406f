pub mod course;
pub mod roles;
pub mod user;
