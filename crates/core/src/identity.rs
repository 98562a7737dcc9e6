//! Caller identity.
//!
//! Every RPC runs at a station on behalf of a VistA user (DUZ). When a request does not name
//! them, the resolver supplies the defaults.

use crate::config::CoreConfig;
use vpr_types::{CallerId, StationId};

/// Supplies the station and caller used when a request does not specify them.
pub trait CallerIdentityResolver: Send + Sync {
    fn default_station(&self) -> StationId;
    fn default_caller(&self) -> CallerId;
}

/// Resolves the caller from the startup configuration.
#[derive(Debug, Clone)]
pub struct ConfigIdentityResolver {
    station: StationId,
    caller: CallerId,
}

impl ConfigIdentityResolver {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            station: config.default_station().clone(),
            caller: config.default_duz().clone(),
        }
    }
}

impl CallerIdentityResolver for ConfigIdentityResolver {
    fn default_station(&self) -> StationId {
        self.station.clone()
    }

    fn default_caller(&self) -> CallerId {
        self.caller.clone()
    }
}
