//! The minimal payload shapes the SDK ships with. The session client is
//! generic over `serde::de::DeserializeOwned`, so applications that need the
//! full vendor schemas define their own types and call
//! [`get_one`](crate::TeslaClient::get_one) /
//! [`get_list`](crate::TeslaClient::get_list) directly.

use serde::{Deserialize, Serialize};

/// Summary record returned by the vehicle list and get endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Vehicle {
    /// Vehicle identifier used in every per-vehicle endpoint path.
    pub id: u64,
    /// Vehicle identification number.
    pub vin: String,
    /// Owner-assigned name.
    pub display_name: String,
    /// `online`, `asleep` or `offline`.
    pub state: String,
}

/// Outcome envelope of fire-and-forget vehicle commands.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CommandResponse {
    /// Whether the vehicle accepted the command.
    pub result: bool,
    /// Vendor-supplied explanation when `result` is false.
    pub reason: String,
}
