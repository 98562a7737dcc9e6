//! # VPR Core
//!
//! Patient data access for VistA.
//!
//! This crate turns a patient's VPR document into typed clinical records and serves it through
//! the cache:
//! - Parsing of `VPR GET PATIENT DATA JSON` output into a [`PatientDataCollection`]
//! - The Vista RPC client seam, executor and response envelopes
//! - Cache-first retrieval via [`get_patient_data`]
//!
//! **No API concerns**: HTTP routing and the command line live in the gateway and `vpr-cli`.

pub mod config;
pub mod constants;
pub mod datetime;
pub mod error;
pub mod identity;
pub mod mappings;
pub mod models;
pub mod parser;
pub mod patient_data;
pub mod rpc;

pub use config::CoreConfig;
pub use error::{ParseError, ParseResult, PatientDataError, PatientDataResult, VistaError};
pub use identity::{CallerIdentityResolver, ConfigIdentityResolver};
pub use models::*;
pub use parser::{parse_vpr_patient_data, parse_vpr_str};
pub use patient_data::{get_patient_data, vpr_invocation};
pub use rpc::{
    build_error_response, build_success_response, execute, translate_vista_error, HttpVistaClient,
    ResponseEnvelope, RpcInvocation, RpcMetadata, RpcParameter, RpcSuccess, VistaRpcClient,
};
