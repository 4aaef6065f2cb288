#![doc = include_str!("../README.md")]

pub(crate) mod api;
mod authenticator;
mod error;
pub mod pkce;
#[allow(missing_docs)]
pub mod settings;

pub use authenticator::{Authenticator, MfaCode, MfaResolver};
pub use error::AuthError;
pub use settings::AuthSettings;
