#![doc = include_str!("../README.md")]

pub mod client;
mod error;
pub mod models;
mod token;

pub use client::{ClientSettings, TeslaClient};
pub use error::{ApiError, InvalidTokenError, VehicleAsleepError};
pub use token::{AccessToken, TokenRefresher};
