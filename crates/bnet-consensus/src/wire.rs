//! Replica wire codec
//!
//! Messages exchanged between replicas are JSON envelopes listing every type
//! they carry. Decoding consults the deserialization filter for each listed
//! type before the body is touched.

use bnet_core::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::serial_filter::SerialFilterSlot;

#[derive(Serialize, Deserialize)]
struct Envelope {
    types: Vec<String>,
    body: serde_json::Value,
}

/// Encode a message; `types` names the message type first, then nested payload types
pub fn encode<T: Serialize>(types: &[&str], message: &T) -> Result<Vec<u8>> {
    let envelope = Envelope {
        types: types.iter().map(|t| t.to_string()).collect(),
        body: serde_json::to_value(message)?,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Decode a message after checking its declared types against the filter
pub fn decode<T: DeserializeOwned>(bytes: &[u8], filter: &SerialFilterSlot) -> Result<T> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    for type_name in &envelope.types {
        filter.check(type_name)?;
    }
    Ok(serde_json::from_value(envelope.body)?)
}
