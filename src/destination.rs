//! Resolves a frame's `dst` field to a channel, including the on-demand
//! dial path for URI destinations.
//!
//! Ported from `canonicalize_dst_uri`, `dst_is_equal` and
//! `mg_rpc_get_channel_info_internal_by_dst` in the original C
//! implementation. The original parses and reassembles URIs with
//! Mongoose's own `mg_parse_uri`/`mg_assemble_uri`; this crate uses the
//! `url` crate for the same job, since canonicalising away the fragment
//! needs an owned, mutable `Url` rather than the teacher's usual
//! borrow-only `url2::Url2` wrapper.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::config::OutboundDefaults;
use crate::error::RpcError;

/// Schemes this crate knows how to dial on demand. Any other scheme seen
/// on a `dst` that looks like a URI is a resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialScheme {
    Ws,
    Wss,
    Http,
    Https,
}

impl DialScheme {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "ws" => Some(DialScheme::Ws),
            "wss" => Some(DialScheme::Wss),
            "http" => Some(DialScheme::Http),
            "https" => Some(DialScheme::Https),
            _ => None,
        }
    }
}

/// Everything needed to open a new outbound channel for a URI destination,
/// with fragment key/value overrides already merged over the configured
/// defaults (spec §4.5).
#[derive(Debug, Clone)]
pub struct DialRequest {
    /// The destination with its fragment stripped; this is what gets
    /// stored as the channel entry's `dst` key for future lookups.
    pub canonical: String,
    pub scheme: DialScheme,
    pub reconnect_interval_min: Duration,
    pub reconnect_interval_max: Duration,
    pub idle_close_timeout: Duration,
    pub ssl_ca_file: Option<String>,
    pub ssl_client_cert_file: Option<String>,
    pub ssl_server_name: Option<String>,
}

/// True if `dst` parses as an absolute URI at all. The original's
/// `mg_parse_uri` is similarly permissive about what counts as a scheme, so
/// a plain peer id containing a colon (e.g. a MAC-like id) can in principle
/// be misread as one -- that ambiguity is inherited, not introduced here.
pub fn is_uri(dst: &str) -> bool {
    Url::parse(dst).is_ok()
}

/// Strips the fragment and reassembles scheme + user-info + host + port +
/// normalised path + query, matching `canonicalize_dst_uri`. Returns `None`
/// if `dst` doesn't parse as a URI at all.
pub fn canonical_form(dst: &str) -> Option<String> {
    let mut url = Url::parse(dst).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Destination equality per spec §4.5: two URI destinations are equal if
/// their canonical forms match; a URI and a non-URI are never equal; two
/// non-URIs are equal iff byte-identical.
pub fn destinations_equal(a: &str, b: &str) -> bool {
    match (canonical_form(a), canonical_form(b)) {
        (Some(ca), Some(cb)) => ca == cb,
        (None, None) => a == b,
        _ => false,
    }
}

/// Decodes the `#key=value&key=value` fragment of a destination URI into a
/// percent-decoded key/value map, matching `mg_get_http_var`'s reuse for
/// fragment parsing in the original.
fn fragment_params(url: &Url) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let fragment = match url.fragment() {
        Some(f) => f,
        None => return params,
    };
    for pair in fragment.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        let key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
        let value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
        params.insert(key.into_owned(), value.into_owned());
    }
    params
}

fn parse_secs(params: &HashMap<String, String>, key: &str, default: Duration) -> Duration {
    params
        .get(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Builds a [`DialRequest`] for a URI destination whose scheme is dialable,
/// merging fragment overrides over `defaults`. Returns
/// `RpcError::DestinationUnresolved` for anything that isn't a URI, or
/// whose scheme this crate doesn't know how to dial.
pub fn build_dial_request(dst: &str, defaults: &OutboundDefaults) -> Result<DialRequest, RpcError> {
    let url = Url::parse(dst).map_err(|_| RpcError::DestinationUnresolved(dst.to_string()))?;
    let scheme = DialScheme::from_str(url.scheme())
        .ok_or_else(|| RpcError::DestinationUnresolved(dst.to_string()))?;

    let params = fragment_params(&url);
    let canonical = canonical_form(dst).expect("already parsed as a Url above");

    Ok(DialRequest {
        canonical,
        scheme,
        reconnect_interval_min: parse_secs(
            &params,
            "reconnect_interval_min",
            defaults.reconnect_interval_min,
        ),
        reconnect_interval_max: parse_secs(
            &params,
            "reconnect_interval_max",
            defaults.reconnect_interval_max,
        ),
        idle_close_timeout: parse_secs(&params, "idle_close_timeout", defaults.idle_close_timeout),
        ssl_ca_file: params
            .get("ssl_ca_file")
            .cloned()
            .or_else(|| defaults.ssl_ca_file.clone()),
        ssl_client_cert_file: params
            .get("ssl_client_cert_file")
            .cloned()
            .or_else(|| defaults.ssl_client_cert_file.clone()),
        ssl_server_name: params
            .get("ssl_server_name")
            .cloned()
            .or_else(|| defaults.ssl_server_name.clone()),
    })
}
