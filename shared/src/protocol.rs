/// Query operation paths, named after the master server operations
pub const LOOKUP_SERVER_BY_NAME: &str = "/v1/LookupServerByName";
pub const LOOKUP_SERVER_BY_ADDRESS: &str = "/v1/LookupServerByAddress";
pub const GET_ONLINE_SERVER_LIST: &str = "/v1/GetOnlineServerList";
pub const GET_ONLINE_SERVER_LIST_HASH: &str = "/v1/GetOnlineServerList/hash";

/// Heartbeat ingest path
pub const HEARTBEAT: &str = "/v1/Heartbeat";

/// Diagnostics counters
pub const STATS: &str = "/v1/stats";

/// Well-known product names
pub const PRODUCT_NWN1: &str = "NWN1";
pub const PRODUCT_NWN2: &str = "NWN2";

/// `ExpansionsMask` bit values
pub const EXPANSION_NONE: u32 = 0x00;
pub const EXPANSION_XP1: u32 = 0x01;
pub const EXPANSION_XP2: u32 = 0x02;
