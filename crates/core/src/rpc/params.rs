//! RPC parameter shapes and builders.
//!
//! Vista API X takes an ordered list of parameters, each carrying exactly one of `string`,
//! `ref`, `array` or `namedArray`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcParameter {
    String(String),
    Ref(String),
    Array(Vec<String>),
    NamedArray(BTreeMap<String, String>),
}

pub fn single_string(value: impl Into<String>) -> Vec<RpcParameter> {
    vec![RpcParameter::String(value.into())]
}

/// One `string` parameter per value, in order.
pub fn multi_string<I, S>(values: I) -> Vec<RpcParameter>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .map(|value| RpcParameter::String(value.into()))
        .collect()
}

pub fn named_array<I, K, V>(entries: I) -> Vec<RpcParameter>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let entries = entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect();
    vec![RpcParameter::NamedArray(entries)]
}

/// Named array addressing a patient by ICN, as `{"patientId": "; <icn>"}`.
pub fn icn_named_array(icn: &str) -> Vec<RpcParameter> {
    named_array([("patientId", format!("; {icn}"))])
}

pub fn empty() -> Vec<RpcParameter> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(single_string("237")).expect("json"),
            json!([{"string": "237"}])
        );
        assert_eq!(
            serde_json::to_value(multi_string(["a", "b"])).expect("json"),
            json!([{"string": "a"}, {"string": "b"}])
        );
        assert_eq!(
            serde_json::to_value(named_array([("patientId", "237")])).expect("json"),
            json!([{"namedArray": {"patientId": "237"}}])
        );
        assert_eq!(
            serde_json::to_value(icn_named_array("10108V420871")).expect("json"),
            json!([{"namedArray": {"patientId": "; 10108V420871"}}])
        );
        assert_eq!(
            serde_json::to_value(vec![
                RpcParameter::Ref("^TMP".into()),
                RpcParameter::Array(vec!["1".into()])
            ])
            .expect("json"),
            json!([{"ref": "^TMP"}, {"array": ["1"]}])
        );
        assert!(empty().is_empty());
    }
}
