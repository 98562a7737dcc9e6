//! Patient data access.
//!
//! [`get_patient_data`] serves a patient view from the cache when it can, and otherwise fetches
//! the VPR document over RPC, parses it and stores the result for the next caller.

use crate::constants::{
    RPC_ERROR_CODE, RPC_ERROR_STATUS, RPC_ERROR_TYPE, VPR_PATIENT_DATA_RPC, VPR_RPC_CONTEXT,
};
use crate::models::PatientDataCollection;
use crate::parser::parse_vpr_patient_data;
use crate::rpc::{execute, params, RpcInvocation, VistaRpcClient};
use crate::{PatientDataResult, VistaError};
use vpr_cache::{PatientCacheKey, PatientDataCache};
use vpr_types::{CallerId, PatientId, StationId};

/// The invocation that fetches one patient's full VPR document.
pub fn vpr_invocation(station: &StationId, dfn: &PatientId, caller: &CallerId) -> RpcInvocation {
    RpcInvocation::new(VPR_PATIENT_DATA_RPC, station.clone(), caller.clone())
        .with_context(VPR_RPC_CONTEXT)
        .with_parameters(params::named_array([("patientId", dfn.as_str())]))
        .with_json_result(true)
}

/// Fetch the parsed patient record for `dfn` at `station` as seen by `caller`.
///
/// A cached collection is returned without touching VistA. A failed cache write is logged by the
/// cache and does not fail the call.
///
/// # Errors
/// [`crate::PatientDataError::Vista`] with type `RPC_ERROR` when the RPC or the parse fails.
pub async fn get_patient_data(
    client: &dyn VistaRpcClient,
    cache: &PatientDataCache,
    station: &StationId,
    dfn: &PatientId,
    caller: &CallerId,
) -> PatientDataResult<PatientDataCollection> {
    let key = PatientCacheKey::new(station.clone(), dfn.clone(), caller.clone());

    if let Some(cached) = cache.get_patient_data::<PatientDataCollection>(&key).await {
        tracing::debug!("patient data cache hit for {}", key);
        return Ok(cached);
    }
    tracing::debug!("patient data cache miss for {}", key);

    let invocation = vpr_invocation(station, dfn, caller);
    let outcome = execute(
        client,
        &invocation,
        |raw| parse_vpr_patient_data(&raw, station.as_str(), dfn.as_str()),
        |message, _metadata| {
            VistaError::new(RPC_ERROR_TYPE, RPC_ERROR_CODE, message, RPC_ERROR_STATUS)
        },
    )
    .await?;

    let collection = outcome.parsed_data;
    if !cache.set_patient_data(&key, &collection, None).await {
        tracing::warn!("patient data for {} was fetched but not cached", key);
    }
    Ok(collection)
}
