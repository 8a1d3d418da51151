use serde::Serialize;
use sha2::{Digest, Sha256};
use master_shared::types::GameServer;

/// Hash only what a player sees in the server browser. LastHeartbeat moves on
/// every heartbeat without the listing changing.
#[derive(Serialize)]
struct HashView<'a> {
    server_address: &'a str,
    server_name: &'a str,
    module_name: &'a str,
    build_number: u32,
    expansions_mask: u32,
    active_player_count: u32,
    maximum_player_count: u32,
    local_vault: bool,
    private_server: bool,
    online: bool,
}

/// Computes a SHA-256 hash of a server list.
/// Servers are sorted by address for deterministic output.
pub fn compute_hash(servers: &[GameServer]) -> String {
    let mut indices: Vec<usize> = (0..servers.len()).collect();
    indices.sort_by(|&a, &b| servers[a].server_address.cmp(&servers[b].server_address));

    let views: Vec<HashView<'_>> = indices
        .iter()
        .map(|&i| {
            let s = &servers[i];
            HashView {
                server_address: &s.server_address,
                server_name: &s.server_name,
                module_name: &s.module_name,
                build_number: s.build_number,
                expansions_mask: s.expansions_mask,
                active_player_count: s.active_player_count,
                maximum_player_count: s.maximum_player_count,
                local_vault: s.local_vault,
                private_server: s.private_server,
                online: s.online,
            }
        })
        .collect();

    let json = serde_json::to_string(&views)
        .expect("Failed to serialize servers for hashing");

    let hash = Sha256::digest(json.as_bytes());
    hex::encode(hash)
}
