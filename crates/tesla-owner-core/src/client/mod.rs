//! Owner API session client

#[allow(clippy::module_inception)]
mod client;
#[allow(missing_docs)]
pub mod client_settings;
mod response;

pub use client::TeslaClient;
pub use client_settings::ClientSettings;
