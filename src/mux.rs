//! The multiplexer façade: ties the frame codec, destination resolver,
//! channel table, queue and pending-request table together behind the
//! public API.
//!
//! Grounded on `mg_rpc_create`/`mg_rpc_callf`/`mg_rpc_ev_handler` and
//! friends in the original; structurally on `transport/multiplexer.rs`
//! for the idea of a single façade type owning every collaborator.

use std::rc::Rc;

use log::{debug, error};
use serde_json::value::RawValue;

use crate::channel::{Channel, ChannelDialer, ChannelEvent, ChannelId, ChannelTable};
use crate::config::{MuxConfig, OutboundDefaults};
use crate::destination;
use crate::frame::{self, Frame};
use crate::handlers;
use crate::observer::{ObserverCallback, ObserverEvent, ObserverId, ObserverTable};
use crate::pending::{PendingTable, ResultCallback};
use crate::queue::Queue;

/// Per-dispatch metadata handed to handlers alongside the request info,
/// mirroring `mg_rpc_frame_info`.
pub struct FrameInfo {
    pub channel_type: String,
}

/// Owned copy of the fields of an inbound request, handed to the matching
/// handler. Ported from `mg_rpc_request_info`: every string field is a
/// duplicate, never a borrow, because the handler may hold onto it past
/// the synchronous dispatch that created it (spec §9, "string ownership").
pub struct RequestInfo {
    pub id: i64,
    pub src: String,
    pub dst: String,
    pub tag: String,
    pub auth: Option<String>,
    pub method: String,
    pub args_fmt: String,
    pub channel: Rc<dyn Channel>,
    pub authenticated_user: Option<String>,
}

/// A snapshot of one registered channel entry, as returned by
/// [`Multiplexer::channel_info`]. Ported from `mg_rpc_get_channel_info`'s
/// `struct mg_rpc_channel_info`, with owned `String` fields instead of the
/// original's separately-freed `mg_str`s.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub dst: String,
    pub channel_type: String,
    pub info: String,
    pub is_open: bool,
    pub is_persistent: bool,
    pub is_broadcast_enabled: bool,
}

/// A registered method handler. Takes ownership of the request info (the
/// handler is responsible for eventually calling `send_response` or
/// `send_error`) and a `&mut Multiplexer` so it can do so.
pub type HandlerCb = Box<dyn FnMut(RequestInfo, FrameInfo, Option<&RawValue>, &mut Multiplexer)>;

/// Gate invoked before handler dispatch; returning `false` skips the
/// handler (the prehandler is then responsible for responding).
pub type PrehandlerCb = Box<dyn FnMut(&RequestInfo, &FrameInfo, Option<&RawValue>) -> bool>;

struct HandlerInfo {
    method: String,
    args_fmt: String,
    cb: HandlerCb,
}

/// Options accepted by [`Multiplexer::callf`], mirroring
/// `mg_rpc_call_opts`.
#[derive(Default)]
pub struct CallOpts<'a> {
    pub dst: &'a str,
    pub src: Option<&'a str>,
    pub tag: &'a str,
    pub key: &'a str,
    pub broadcast: bool,
    pub no_queue: bool,
}

/// The multiplexer instance. Owns every table named in spec §3; there is
/// no hidden global state (Design Notes: "model as an explicit value
/// constructed by the application").
pub struct Multiplexer {
    config: MuxConfig,
    outbound_defaults: OutboundDefaults,
    next_id: u64,
    local_ids: Vec<String>,
    handlers: Vec<HandlerInfo>,
    channels: ChannelTable,
    requests: PendingTable,
    observers: ObserverTable,
    queue: Queue,
    prehandler: Option<PrehandlerCb>,
    dialer: Option<Box<dyn ChannelDialer>>,
}

impl Multiplexer {
    pub fn new(config: MuxConfig, outbound_defaults: OutboundDefaults) -> Self {
        let max_queue_length = config.max_queue_length;
        let mut local_ids = Vec::new();
        if !config.id.is_empty() {
            local_ids.push(config.id.clone());
        }
        Multiplexer {
            config,
            outbound_defaults,
            next_id: 0,
            local_ids,
            handlers: Vec::new(),
            channels: ChannelTable::new(),
            requests: PendingTable::new(),
            observers: ObserverTable::new(),
            queue: Queue::new(max_queue_length),
            prehandler: None,
            dialer: None,
        }
    }

    /// Installs the collaborator used to open outbound channels implied
    /// by URI destinations (spec §4.5). Without one, URI destinations
    /// always fail to resolve.
    pub fn set_dialer(&mut self, dialer: Box<dyn ChannelDialer>) {
        self.dialer = Some(dialer);
    }

    pub fn add_local_id(&mut self, id: &str) {
        if id.is_empty() {
            return;
        }
        self.local_ids.push(id.to_string());
    }

    fn is_local_id(&self, id: &str) -> bool {
        self.local_ids.iter().any(|l| l == id)
    }

    pub fn add_handler(&mut self, method: &str, args_fmt: &str, cb: HandlerCb) {
        self.handlers.push(HandlerInfo {
            method: method.to_string(),
            args_fmt: args_fmt.to_string(),
            cb,
        });
    }

    /// Registers `RPC.List`, `RPC.Describe` and `RPC.Ping` (spec §4.8).
    pub fn add_list_handler(&mut self) {
        self.add_handler("RPC.List", "", Box::new(handlers::list_handler));
        self.add_handler("RPC.Describe", "{name}", Box::new(handlers::describe_handler));
        self.add_handler("RPC.Ping", "", Box::new(handlers::ping_handler));
    }

    pub(crate) fn handler_methods(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.method.as_str()).collect()
    }

    pub(crate) fn handler_args_fmt(&self, method: &str) -> Option<&str> {
        self.handlers
            .iter()
            .find(|h| h.method == method)
            .map(|h| h.args_fmt.as_str())
    }

    pub fn set_prehandler(&mut self, cb: PrehandlerCb) {
        self.prehandler = Some(cb);
    }

    pub fn add_observer(&mut self, cb: ObserverCallback) -> ObserverId {
        self.observers.add(cb)
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    pub fn add_channel(&mut self, dst: &str, channel: Rc<dyn Channel>) -> ChannelId {
        let id = self.channels.insert(dst.to_string(), channel);
        if let Some(entry) = self.channels.get(id) {
            debug!("{:?} '{}' {}", id, dst, entry.channel.channel_type());
        }
        id
    }

    pub fn connect(&mut self) {
        for (_, entry) in self.channels.iter() {
            entry.channel.connect();
        }
    }

    pub fn disconnect(&mut self) {
        for (_, entry) in self.channels.iter() {
            entry.channel.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channels
            .default_entry()
            .and_then(|id| self.channels.get(id))
            .map(|e| e.is_open)
            .unwrap_or(false)
    }

    pub fn can_send(&self) -> bool {
        self.channels
            .default_entry()
            .and_then(|id| self.channels.get(id))
            .map(|e| e.is_open && !e.is_busy)
            .unwrap_or(false)
    }

    /// Snapshots every registered channel entry (spec supplement, ported
    /// from `mg_rpc_get_channel_info`).
    pub fn channel_info(&self) -> Vec<ChannelInfo> {
        self.channels
            .iter()
            .map(|(_, e)| ChannelInfo {
                dst: e.dst.clone(),
                channel_type: e.channel.channel_type().to_string(),
                info: e.channel.info().unwrap_or_default(),
                is_open: e.is_open,
                is_persistent: e.channel.is_persistent(),
                is_broadcast_enabled: e.channel.is_broadcast_enabled(),
            })
            .collect()
    }

    fn next_request_id(&mut self) -> i64 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id as i64
    }

    /// Spec §4.5: exact-match scan first; URI destinations with a
    /// dialable scheme are resolved by creating (or reusing) an outbound
    /// channel; anything else falls back to the default entry.
    fn resolve_destination(&mut self, dst: &str) -> Option<ChannelId> {
        if let Some(id) = self.channels.find_exact(dst) {
            return Some(id);
        }
        if !destination::is_uri(dst) {
            return self.channels.default_entry();
        }
        match destination::build_dial_request(dst, &self.outbound_defaults) {
            Ok(req) => {
                let dialer = self.dialer.as_mut()?;
                match dialer.dial(&req) {
                    Some(channel) => {
                        let id = self.channels.insert(req.canonical.clone(), channel.clone());
                        channel.connect();
                        Some(id)
                    }
                    None => {
                        error!("failed to create RPC channel from {}", dst);
                        None
                    }
                }
            }
            Err(_) => {
                error!("unsupported connection scheme in {}", dst);
                None
            }
        }
    }

    fn send_direct(&mut self, id: Option<ChannelId>, frame: &str) -> bool {
        let entry = match id.and_then(|id| self.channels.get_mut(id)) {
            Some(e) => e,
            None => return false,
        };
        if !entry.is_open || entry.is_busy {
            return false;
        }
        let ok = entry.channel.send_frame(frame.as_bytes());
        debug!(
            "{} send frame ({}): {} -> {}",
            entry.channel.channel_type(),
            frame.len(),
            frame,
            ok
        );
        if ok {
            entry.is_busy = true;
        }
        ok
    }

    fn enqueue(&mut self, dst: &str, pinned: Option<ChannelId>, frame: String) -> bool {
        let ok = self.queue.push(dst.to_string(), frame, pinned);
        if ok {
            debug!("queued frame ({} entries)", self.queue.len());
        }
        ok
    }

    fn process_queue(&mut self) {
        let mut queue = std::mem::replace(&mut self.queue, Queue::new(self.config.max_queue_length));
        queue.drain(|entry| {
            let id = entry.pinned.or_else(|| self.resolve_destination(&entry.dst));
            self.send_direct(id, &entry.frame)
        });
        self.queue = queue;
    }

    /// Assembles and attempts to send a frame, enqueuing on failure if
    /// permitted. Ported from `mg_rpc_dispatch_frame`.
    fn dispatch_frame(
        &mut self,
        src: &str,
        dst: &str,
        id: i64,
        tag: &str,
        key: &str,
        pinned: Option<ChannelId>,
        enqueue_on_fail: bool,
        payload_prefix: &str,
    ) -> bool {
        let resolved = pinned.or_else(|| self.resolve_destination(dst));
        // URI destinations are point-to-point hints consumed by
        // resolution: once dialed, the wire frame carries no `dst`.
        let final_dst = if destination::is_uri(dst) { "" } else { dst };
        let src = if src.is_empty() { self.config.id.as_str() } else { src };
        let frame_str = frame::emit(id, src, final_dst, tag, key, payload_prefix);

        if self.send_direct(resolved, &frame_str) {
            true
        } else if enqueue_on_fail {
            self.enqueue(final_dst, resolved, frame_str)
        } else {
            debug!("dropped frame ({}): {}", frame_str.len(), frame_str);
            false
        }
    }

    /// Issues an outgoing request. Returns `true` iff at least one frame
    /// was sent or queued (spec §4.2).
    pub fn callf(
        &mut self,
        method: &str,
        cb: Option<ResultCallback>,
        opts: CallOpts<'_>,
        args_json: Option<&str>,
    ) -> bool {
        let id = self.next_request_id();
        let mut payload_prefix = String::new();
        if cb.is_none() {
            payload_prefix.push_str("\"nr\":true,");
        }
        payload_prefix.push_str("\"method\":");
        payload_prefix.push_str(&frame::json_quote(method));
        if let Some(args) = args_json {
            payload_prefix.push_str(",\"args\":");
            payload_prefix.push_str(args);
        }

        let src = opts.src.unwrap_or("");
        let result = if !opts.broadcast {
            let enqueue = !opts.no_queue;
            self.dispatch_frame(src, opts.dst, id, opts.tag, opts.key, None, enqueue, &payload_prefix)
        } else {
            let targets: Vec<ChannelId> = self
                .channels
                .iter()
                .filter(|(_, e)| e.channel.is_broadcast_enabled())
                .map(|(id, _)| id)
                .collect();
            let mut any = false;
            for target in targets {
                any |= self.dispatch_frame(src, opts.dst, id, opts.tag, opts.key, Some(target), false, &payload_prefix);
            }
            any
        };

        if result {
            if let Some(cb) = cb {
                self.requests.register(id, cb);
            }
            true
        } else {
            false
        }
    }

    /// Emits a response, src/dst swapped from the originating request, on
    /// the same channel the request arrived on. Consumes `ri`.
    pub fn send_response(&mut self, ri: RequestInfo, result_json: &str) -> bool {
        let pinned = self.channels.find_by_channel(&ri.channel);
        let payload_prefix = format!("\"result\":{}", result_json);
        self.dispatch_frame(&ri.dst, &ri.src, ri.id, &ri.tag, "", pinned, true, &payload_prefix)
    }

    /// Emits an error response. `message`, if present, is JSON-quoted as a
    /// plain string scalar. Consumes `ri`.
    pub fn send_error(&mut self, ri: RequestInfo, code: i64, message: Option<&str>) -> bool {
        let pinned = self.channels.find_by_channel(&ri.channel);
        let mut payload_prefix = format!("\"error\":{{\"code\":{}", code);
        if let Some(msg) = message {
            payload_prefix.push_str(",\"message\":");
            payload_prefix.push_str(&frame::json_quote(msg));
        }
        payload_prefix.push('}');
        self.dispatch_frame(&ri.dst, &ri.src, ri.id, &ri.tag, "", pinned, true, &payload_prefix)
    }

    /// Releases a request info without responding. Exposed for parity with
    /// the original's explicit free; a plain `drop` would do the same
    /// thing, since every field is owned.
    pub fn free_request_info(&self, ri: RequestInfo) {
        drop(ri);
    }

    /// Entry point transports call into with lifecycle and frame events
    /// (spec §4.7).
    pub fn handle_channel_event(&mut self, id: ChannelId, event: ChannelEvent) {
        match event {
            ChannelEvent::Open => {
                if let Some(entry) = self.channels.get_mut(id) {
                    entry.is_open = true;
                    entry.is_busy = false;
                }
                debug!("{:?} chan open", id);
                self.process_queue();
                if let Some(entry) = self.channels.get(id) {
                    if !entry.dst.is_empty() {
                        let dst = entry.dst.clone();
                        self.observers.notify(ObserverEvent::ChannelOpen, &dst);
                    }
                }
            }
            ChannelEvent::FrameRecd(raw) => match Frame::decode(raw) {
                Ok(frame) => {
                    if !self.handle_frame(id, &frame) {
                        error!("{:?} invalid frame ({}): '{}'", id, raw.len(), raw);
                        self.maybe_close_non_persistent(id);
                    }
                }
                Err(e) => {
                    error!("{:?} invalid frame ({}): '{}'", id, e, raw);
                    self.maybe_close_non_persistent(id);
                }
            },
            ChannelEvent::FrameRecdParsed(frame) => {
                if !self.handle_frame(id, &frame) {
                    error!("{:?} invalid parsed frame from {}", id, frame.src);
                    self.maybe_close_non_persistent(id);
                }
            }
            ChannelEvent::FrameSent { success } => {
                if let Some(entry) = self.channels.get_mut(id) {
                    entry.is_busy = false;
                }
                debug!("{:?} frame sent ({})", id, success);
                self.process_queue();
            }
            ChannelEvent::Closed => {
                let outcome = self.channels.get_mut(id).map(|entry| {
                    entry.is_open = false;
                    entry.is_busy = false;
                    (!entry.channel.is_persistent(), entry.dst.clone())
                });
                let (remove, dst) = match outcome {
                    Some(o) => o,
                    None => return,
                };
                debug!("{:?} chan closed, remove? {}", id, remove);
                if !dst.is_empty() {
                    self.observers.notify(ObserverEvent::ChannelClosed, &dst);
                }
                if remove {
                    self.queue.purge_pinned_to(id);
                    if let Some(entry) = self.channels.remove(id) {
                        entry.channel.destroy();
                    }
                }
            }
        }
    }

    fn maybe_close_non_persistent(&mut self, id: ChannelId) {
        if let Some(entry) = self.channels.get(id) {
            if !entry.channel.is_persistent() {
                entry.channel.close();
            }
        }
    }

    fn handle_frame(&mut self, id: ChannelId, frame: &Frame) -> bool {
        let is_open = self.channels.get(id).map(|e| e.is_open).unwrap_or(false);
        if !is_open {
            error!("{:?} ignored frame from closed channel", id);
            return false;
        }
        if !frame.dst.is_empty() && !self.is_local_id(frame.dst) {
            error!("wrong dst: '{}'", frame.dst);
            return false;
        }
        if let Some(entry) = self.channels.get_mut(id) {
            if entry.dst.is_empty() {
                entry.dst = frame.src.to_string();
            }
        }
        if frame.is_request() {
            self.handle_request(id, frame)
        } else {
            self.handle_response(frame)
        }
    }

    fn handle_request(&mut self, id: ChannelId, frame: &Frame) -> bool {
        let channel = match self.channels.get(id) {
            Some(e) => e.channel.clone(),
            None => return false,
        };
        let mut ri = RequestInfo {
            id: frame.id,
            src: frame.src.to_string(),
            dst: frame.dst.to_string(),
            tag: frame.tag.to_string(),
            auth: frame.auth.map(|a| a.get().to_string()),
            method: frame.method.to_string(),
            args_fmt: String::new(),
            channel: channel.clone(),
            authenticated_user: None,
        };

        let idx = match self.handlers.iter().position(|h| h.method == ri.method) {
            Some(idx) => idx,
            None => {
                error!("no handler for {}", ri.method);
                self.send_error(ri, 404, Some(&format!("No handler for {}", frame.method)));
                return true;
            }
        };
        ri.args_fmt = self.handlers[idx].args_fmt.clone();

        let fi = FrameInfo {
            channel_type: channel.channel_type().to_string(),
        };
        let args = frame.args;

        let mut ok = true;
        if let Some(prehandler) = self.prehandler.as_mut() {
            ok = prehandler(&ri, &fi, args);
        }
        if ok {
            let mut cb = std::mem::replace(&mut self.handlers[idx].cb, Box::new(|_, _, _, _| {}));
            cb(ri, fi, args, self);
            if let Some(h) = self.handlers.get_mut(idx) {
                h.cb = cb;
            }
        }
        true
    }

    fn handle_response(&mut self, frame: &Frame) -> bool {
        if frame.id == 0 {
            error!("response without an id");
            return false;
        }
        let error_code = frame.error.map(|e| e.code).unwrap_or(0);
        let error_msg = frame.error.and_then(|e| if e.message.is_empty() { None } else { Some(e.message) });
        self.requests.complete(frame.id, frame.result, error_code, error_msg);
        true
    }
}
