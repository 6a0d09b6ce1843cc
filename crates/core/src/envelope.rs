// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal envelope parsing: pull `instance_id` out of a payload without
//! committing to its full shape, since each topic's body has its own schema.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ThinEnvelope {
    instance_id: Option<String>,
}

/// Extract `instance_id` from a raw JSON payload, if present and a string.
pub fn extract_instance_id(payload: &serde_json::Value) -> Option<String> {
    serde_json::from_value::<ThinEnvelope>(payload.clone())
        .ok()
        .and_then(|e| e.instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_instance_id_when_present() {
        let payload = serde_json::json!({ "instance_id": "site-a", "other": 1 });
        assert_eq!(extract_instance_id(&payload).as_deref(), Some("site-a"));
    }

    #[test]
    fn returns_none_when_absent() {
        let payload = serde_json::json!({ "other": 1 });
        assert_eq!(extract_instance_id(&payload), None);
    }
}
