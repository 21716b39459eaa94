//! Configuration of the mediation core.

use std::time::Duration;

use serde::Deserialize;

/// Settings shared by the node registry, the remapper and the redaction
/// engine.
///
/// Every field has a default, so the struct can be embedded as a section of
/// the host gateway's configuration file and only overridden values need to
/// be written down.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediationConfig {
    /// Name of the directive (without `@`) marking values as sensitive.
    pub redact_directive: String,

    /// Text substituted for every redacted value in logs.
    pub redact_placeholder: String,

    /// Interface implemented by every type reachable through a global ID.
    pub node_interface: String,

    /// Interface implemented by the error members of result unions. If the
    /// schema declares it, errors are only ever remapped to its implementors.
    pub error_interface: String,

    /// Directive on node types naming the fields that form the ID components.
    pub global_id_directive: String,

    /// Redacted queries larger than this are logged in a separate event.
    pub max_logged_query_bytes: usize,

    /// Upper bound for a single node fetch. `None` waits for the handler.
    #[serde(with = "millis")]
    pub node_fetch_timeout: Option<Duration>,
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            redact_directive: "scrub".into(),
            redact_placeholder: "<scrubbed>".into(),
            node_interface: "Node".into(),
            error_interface: "Error".into(),
            global_id_directive: "globalId".into(),
            // Cloud logging truncates entries at 256kB, we want headroom.
            max_logged_query_bytes: 128 * 1024,
            node_fetch_timeout: None,
        }
    }
}

impl MediationConfig {
    /// Parse a configuration section given as JSON.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
