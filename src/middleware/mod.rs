pub mod hmac_auth;
pub mod validation;

pub use hmac_auth::hmac_auth;
pub use validation::ValidatedJson;
