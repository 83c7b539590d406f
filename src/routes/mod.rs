pub mod auth;
pub mod courses;
pub mod effective_user;
pub mod health;
