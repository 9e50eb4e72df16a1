//! Serializes and parses wire frames while keeping every string and
//! object/array field a borrowed view into the input buffer.
//!
//! Ported from `mg_rpc_parse_frame` / `mg_rpc_dispatch_frame` in the
//! original C implementation, but built around `serde_json`'s zero-copy
//! borrowing instead of a hand-rolled JSON scanner.

use std::fmt::Write as _;

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::RpcError;

/// Reserved destination used for "whichever outbound channel is the
/// default one" (the one with an empty `dst`, i.e. point-to-point).
pub const DST_DEFAULT: &str = "$default";

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct WireFrame<'a> {
    v: Option<i64>,
    id: Option<i64>,
    #[serde(borrow)]
    src: Option<&'a str>,
    #[serde(borrow)]
    dst: Option<&'a str>,
    #[serde(borrow)]
    tag: Option<&'a str>,
    #[serde(borrow)]
    key: Option<&'a str>,
    #[serde(borrow)]
    auth: Option<&'a RawValue>,
    #[serde(borrow)]
    method: Option<&'a str>,
    #[serde(borrow)]
    args: Option<&'a RawValue>,
    nr: Option<bool>,
    #[serde(borrow)]
    result: Option<&'a RawValue>,
    #[serde(borrow)]
    error: Option<WireError<'a>>,
}

impl<'a> WireFrame<'a> {
    fn is_empty(&self) -> bool {
        self.v.is_none()
            && self.id.is_none()
            && self.src.is_none()
            && self.dst.is_none()
            && self.tag.is_none()
            && self.key.is_none()
            && self.auth.is_none()
            && self.method.is_none()
            && self.args.is_none()
            && self.nr.is_none()
            && self.result.is_none()
            && self.error.is_none()
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct WireError<'a> {
    code: i64,
    #[serde(borrow, default)]
    message: Option<&'a str>,
}

/// An error payload, borrowed from the decoded frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameError<'a> {
    pub code: i64,
    pub message: &'a str,
}

/// A decoded wire frame. Every field is a borrowed view into the buffer
/// that was decoded; none of it outlives the synchronous dispatch that
/// produced it (spec §5, "Memory").
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub version: Option<i64>,
    /// Zero means absent, matching the C original's `calloc`-zeroed default.
    pub id: i64,
    pub src: &'a str,
    pub dst: &'a str,
    pub tag: &'a str,
    pub key: &'a str,
    pub auth: Option<&'a RawValue>,
    pub method: &'a str,
    pub args: Option<&'a RawValue>,
    pub no_response: bool,
    pub result: Option<&'a RawValue>,
    pub error: Option<FrameError<'a>>,
}

impl<'a> Frame<'a> {
    /// Decodes a wire frame. Fails if the input isn't JSON at all, or if
    /// it parses but recognises none of the frame fields (e.g. `{}` or an
    /// object carrying only unrelated keys) -- the zero-fields case from
    /// spec §4.1.
    pub fn decode(input: &'a str) -> Result<Self, RpcError> {
        let wire: WireFrame<'a> = serde_json::from_str(input)?;
        if wire.is_empty() {
            return Err(RpcError::NotAFrame);
        }

        Ok(Frame {
            version: wire.v,
            id: wire.id.unwrap_or(0),
            src: wire.src.unwrap_or(""),
            dst: wire.dst.unwrap_or(""),
            tag: wire.tag.unwrap_or(""),
            key: wire.key.unwrap_or(""),
            auth: wire.auth,
            method: wire.method.unwrap_or(""),
            args: wire.args,
            no_response: wire.nr.unwrap_or(false),
            // `RawValue` keeps the exact source slice, quotes and all, so a
            // string result round-trips as valid JSON with no special-casing.
            result: wire.result,
            error: wire.error.map(|e| FrameError {
                code: e.code,
                message: e.message.unwrap_or(""),
            }),
        })
    }

    /// True if `method` is non-empty: this frame is a request rather than
    /// a response (spec §4.2 step 4).
    pub fn is_request(&self) -> bool {
        !self.method.is_empty()
    }
}

pub(crate) fn json_quote(s: &str) -> String {
    serde_json::to_string(s).expect("string serialization cannot fail")
}

/// Assembles a complete wire frame from the parts dispatch frame
/// construction needs. `payload_prefix` is already-composed JSON key/value
/// segments (e.g. `"method":"Foo","args":{"a":1}` or `"result":{}`), with
/// no leading or trailing comma. Mirrors `mg_rpc_dispatch_frame`'s field
/// ordering and comma placement exactly.
pub fn emit(id: i64, src: &str, dst: &str, tag: &str, key: &str, payload_prefix: &str) -> String {
    let mut out = String::with_capacity(64 + payload_prefix.len());
    out.push('{');
    let mut wrote_field = false;

    if id != 0 {
        write!(out, "\"id\":{}", id).unwrap();
        wrote_field = true;
    }
    if wrote_field {
        out.push(',');
    }
    write!(out, "\"src\":{}", json_quote(src)).unwrap();
    wrote_field = true;

    if !dst.is_empty() {
        if wrote_field {
            out.push(',');
        }
        write!(out, "\"dst\":{}", json_quote(dst)).unwrap();
    }
    if !tag.is_empty() {
        out.push(',');
        write!(out, "\"tag\":{}", json_quote(tag)).unwrap();
    }
    if !key.is_empty() {
        out.push(',');
        write!(out, "\"key\":{}", json_quote(key)).unwrap();
    }
    if !payload_prefix.is_empty() {
        out.push(',');
        out.push_str(payload_prefix);
    }
    out.push('}');
    out
}
