pub mod authorizer;
pub mod error;
pub mod factory;
pub mod jwks;
pub mod policy;
pub mod token;
pub mod verifier;

pub use authorizer::Authorizer;
pub use factory::build_authorizer;
pub use policy::AuthorizerResponse;
