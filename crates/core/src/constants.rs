//! Constants shared across the parser, the RPC layer and the data-access orchestrator.

/// RPC that returns the full VPR document for one patient.
pub const VPR_PATIENT_DATA_RPC: &str = "VPR GET PATIENT DATA JSON";

/// Context the VPR RPC runs under.
pub const VPR_RPC_CONTEXT: &str = "LHS RPC CONTEXT";

/// Context assumed when a call does not name one.
pub const DEFAULT_RPC_CONTEXT: &str = "OR CPRS GUI CHART";

/// Value of `metadata.source` on every executor envelope.
pub const RPC_SOURCE: &str = "VistA RPC";

/// Version stamped on every parsed collection so stale cache entries can be recognised.
pub const COLLECTION_CACHE_VERSION: &str = "1.0";

pub const DEFAULT_STATION: &str = "500";
pub const DEFAULT_DUZ: &str = "10000000219";
pub const DEFAULT_VISTA_TIMEOUT_SECS: u64 = 30;

/// A consult still open after this many days counts as overdue.
pub const CONSULT_OVERDUE_DAYS: i64 = 30;

/// A medication with this many days of supply left or fewer needs a refill soon.
pub const REFILL_WARNING_DAYS: i64 = 7;

/// Error type, code and status reported when the VPR fetch fails.
pub const RPC_ERROR_TYPE: &str = "RPC_ERROR";
pub const RPC_ERROR_CODE: &str = "RPC_FAILED";
pub const RPC_ERROR_STATUS: u16 = 500;
