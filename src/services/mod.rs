pub mod auth;
pub mod market;
pub mod portfolio;
