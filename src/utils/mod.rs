pub mod url_validation;
pub use url_validation::{UrlValidationError, validate_negotiation_url, validate_token_service_url};
