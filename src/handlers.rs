//! Built-in introspection handlers: `RPC.List`, `RPC.Describe`, `RPC.Ping`.
//!
//! Ported from `mg_rpc_list_handler` / `mg_rpc_describe_handler` /
//! `mg_rpc_ping_handler`, registered together by
//! [`Multiplexer::add_list_handler`](crate::mux::Multiplexer::add_list_handler)
//! (mirroring `mg_rpc_add_list_handler`).

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::frame;
use crate::mux::{FrameInfo, Multiplexer, RequestInfo};

pub(crate) fn list_handler(ri: RequestInfo, _fi: FrameInfo, _args: Option<&RawValue>, mux: &mut Multiplexer) {
    let mut out = String::from("[");
    for (i, method) in mux.handler_methods().into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&frame::json_quote(method));
    }
    out.push(']');
    mux.send_response(ri, &out);
}

#[derive(Deserialize)]
struct DescribeArgs<'a> {
    #[serde(borrow)]
    name: &'a str,
}

pub(crate) fn describe_handler(ri: RequestInfo, _fi: FrameInfo, args: Option<&RawValue>, mux: &mut Multiplexer) {
    let name = args
        .and_then(|a| serde_json::from_str::<DescribeArgs<'_>>(a.get()).ok())
        .map(|d| d.name.to_string());
    let name = match name {
        Some(n) => n,
        None => {
            mux.send_error(ri, 400, Some("name is required"));
            return;
        }
    };
    match mux.handler_args_fmt(&name).map(|s| s.to_string()) {
        Some(args_fmt) => {
            let body = format!(
                "{{\"name\":{},\"args_fmt\":{}}}",
                frame::json_quote(&name),
                frame::json_quote(&args_fmt)
            );
            mux.send_response(ri, &body);
        }
        None => {
            mux.send_error(ri, 404, Some("name not found"));
        }
    }
}

pub(crate) fn ping_handler(ri: RequestInfo, _fi: FrameInfo, _args: Option<&RawValue>, mux: &mut Multiplexer) {
    let info = ri.channel.info().unwrap_or_default();
    let body = format!("{{\"channel_info\":{}}}", frame::json_quote(&info));
    mux.send_response(ri, &body);
}
