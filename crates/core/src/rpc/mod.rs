//! VistA RPC plumbing: parameter builders, the client seam, the executor and response envelopes.

pub mod client;
pub mod executor;
pub mod params;
pub mod response;

pub use client::{HttpVistaClient, RpcInvocation, VistaRpcClient};
pub use executor::{execute, translate_vista_error, RpcDetails, RpcMetadata, RpcSuccess};
pub use params::RpcParameter;
pub use response::{build_error_response, build_success_response, ResponseEnvelope};
