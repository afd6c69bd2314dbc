pub mod authorize;
pub mod portfolio;
