pub mod error;
pub mod holding_repo;

pub use error::RepoError;
pub use holding_repo::{Holding, HoldingStore, MemoryHoldingStore, NewHolding, PgHoldingStore};
