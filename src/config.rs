//! Plain, serde-derived configuration structs. Nothing in this crate reads
//! these from a file or environment -- an embedding application owns that --
//! but the structs derive `Serialize`/`Deserialize` so it doesn't have to
//! invent its own shape for them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Immutable multiplexer-wide configuration, set once at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxConfig {
    /// This endpoint's own identity, used as `src` on outbound frames.
    pub id: String,
    /// Default idle-close timeout applied to outbound channels that don't
    /// override it via a URI fragment key.
    #[serde(with = "duration_secs")]
    pub default_out_channel_idle_close_timeout: Duration,
    /// Upper bound on the number of frames held in the send queue at once.
    pub max_queue_length: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        MuxConfig {
            id: String::new(),
            default_out_channel_idle_close_timeout: Duration::from_secs(60),
            max_queue_length: 16,
        }
    }
}

/// Fallback values used when resolving a URI destination into a dial
/// request; any of these can be overridden per-destination by a fragment
/// key/value pair (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundDefaults {
    #[serde(with = "duration_secs")]
    pub reconnect_interval_min: Duration,
    #[serde(with = "duration_secs")]
    pub reconnect_interval_max: Duration,
    #[serde(with = "duration_secs")]
    pub idle_close_timeout: Duration,
    pub ssl_ca_file: Option<String>,
    pub ssl_client_cert_file: Option<String>,
    pub ssl_server_name: Option<String>,
}

impl Default for OutboundDefaults {
    fn default() -> Self {
        OutboundDefaults {
            reconnect_interval_min: Duration::from_secs(1),
            reconnect_interval_max: Duration::from_secs(60),
            idle_close_timeout: Duration::from_secs(60),
            ssl_ca_file: None,
            ssl_client_cert_file: None,
            ssl_server_name: None,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
