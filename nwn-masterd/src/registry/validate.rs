use master_shared::types::Heartbeat;
use thiserror::Error;

/// Reasons a heartbeat is refused. Nothing in the registry changes when one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("product must not be empty")]
    EmptyProduct,

    #[error("server name must not be empty")]
    EmptyServerName,

    #[error("malformed server address {0:?}, expected \"ip:port\"")]
    MalformedAddress(String),

    #[error("server address {0:?} has a port outside 1-65535")]
    InvalidPort(String),
}

/// Check a heartbeat and return it with its keys trimmed.
pub fn validate(mut heartbeat: Heartbeat) -> Result<Heartbeat, IngestError> {
    heartbeat.product = heartbeat.product.trim().to_string();
    heartbeat.server_address = heartbeat.server_address.trim().to_string();

    if heartbeat.product.is_empty() {
        return Err(IngestError::EmptyProduct);
    }
    if heartbeat.server_name.trim().is_empty() {
        return Err(IngestError::EmptyServerName);
    }
    validate_address(&heartbeat.server_address)?;

    if heartbeat.maximum_player_count > 0
        && heartbeat.active_player_count > heartbeat.maximum_player_count
    {
        tracing::warn!(
            "{} reports {} of {} players, clamping",
            heartbeat.server_address,
            heartbeat.active_player_count,
            heartbeat.maximum_player_count
        );
        heartbeat.active_player_count = heartbeat.maximum_player_count;
    }

    Ok(heartbeat)
}

/// Accepts `host:port` with a decimal port in 1-65535. IPv6 hosts are
/// bracketed, as in `[::1]:5121`.
pub fn validate_address(address: &str) -> Result<(), IngestError> {
    let malformed = || IngestError::MalformedAddress(address.to_string());

    let (host, port) = address.rsplit_once(':').ok_or_else(malformed)?;

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(malformed());
    }
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        return Err(malformed());
    }
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    match port.parse::<u32>() {
        Ok(1..=65535) => Ok(()),
        _ => Err(IngestError::InvalidPort(address.to_string())),
    }
}
