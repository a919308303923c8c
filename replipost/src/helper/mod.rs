pub mod admin_helpers;
pub mod duplicate_helpers;
pub mod form_helpers;
pub mod nonce_helpers;
pub mod sanitization_helpers;
