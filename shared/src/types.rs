use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A game server known to the master server.
/// Field names serialize exactly as the existing master server clients expect
/// them ("ServerAddress", "LastHeartbeat", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameServer {
    /// Product name, e.g. "NWN1" or "NWN2"
    pub product: String,

    /// Bitmask of required expansions (see `protocol::EXPANSION_*`)
    pub expansions_mask: u32,

    /// Game server software build number
    pub build_number: u32,

    /// Name of the loaded module, if any
    pub module_name: String,

    /// Display name of the server; not unique
    pub server_name: String,

    /// Players currently logged on
    pub active_player_count: u32,

    /// Configured limit on concurrent players
    pub maximum_player_count: u32,

    /// True for a local vault server, false for a server vault server
    pub local_vault: bool,

    /// Last time the server heartbeated
    pub last_heartbeat: DateTime<Utc>,

    /// "ip:port" used by player clients to connect directly
    pub server_address: String,

    /// Whether the server is currently online
    pub online: bool,

    /// Whether a player password is required to connect
    pub private_server: bool,
}

/// A heartbeat announcement from a running game server, as handed over by the
/// transport. The receipt timestamp travels separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Heartbeat {
    pub product: String,
    pub server_address: String,
    pub server_name: String,
    #[serde(default)]
    pub module_name: String,
    #[serde(default)]
    pub build_number: u32,
    #[serde(default)]
    pub expansions_mask: u32,
    #[serde(default)]
    pub active_player_count: u32,
    #[serde(default)]
    pub maximum_player_count: u32,
    #[serde(default)]
    pub local_vault: bool,
    #[serde(default)]
    pub private_server: bool,
}

impl Heartbeat {
    /// Build the online record this heartbeat describes.
    pub fn into_record(self, received_at: DateTime<Utc>) -> GameServer {
        GameServer {
            product: self.product,
            expansions_mask: self.expansions_mask,
            build_number: self.build_number,
            module_name: self.module_name,
            server_name: self.server_name,
            active_player_count: self.active_player_count,
            maximum_player_count: self.maximum_player_count,
            local_vault: self.local_vault,
            last_heartbeat: received_at,
            server_address: self.server_address,
            online: true,
            private_server: self.private_server,
        }
    }
}
