//! Minimal end-to-end demo: wires two `Multiplexer`s together over an
//! in-process loopback pair, registers the built-in introspection
//! handlers plus a trivial echo method, and drives a couple of calls.
//!
//! Run with `RUST_LOG=debug` to see the frames fly.

use std::cell::RefCell;
use std::rc::Rc;

use rpc_mux::{CallOpts, Channel, ChannelEvent, ChannelId, MuxConfig, Multiplexer, OutboundDefaults, DST_DEFAULT};

/// Delivers frames synchronously to whatever multiplexer holds the other
/// end, by way of a shared `RefCell<Vec<String>>` outbox drained right
/// after `send_frame` -- there is no thread or event loop involved.
struct LoopbackChannel {
    outbox: RefCell<Vec<String>>,
}

impl LoopbackChannel {
    fn new() -> Rc<Self> {
        Rc::new(LoopbackChannel { outbox: RefCell::new(Vec::new()) })
    }
}

impl Channel for LoopbackChannel {
    fn connect(&self) {}
    fn close(&self) {}
    fn destroy(&self) {}

    fn send_frame(&self, frame: &[u8]) -> bool {
        self.outbox.borrow_mut().push(String::from_utf8_lossy(frame).into_owned());
        true
    }

    fn channel_type(&self) -> &str {
        "loopback"
    }

    fn info(&self) -> Option<String> {
        Some("loopback".to_string())
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn is_broadcast_enabled(&self) -> bool {
        false
    }
}

fn pump(mux: &mut Multiplexer, id: ChannelId, outbox: &Rc<LoopbackChannel>) {
    loop {
        let frame = outbox.outbox.borrow_mut().pop();
        let frame = match frame {
            Some(f) => f,
            None => break,
        };
        mux.handle_channel_event(id, ChannelEvent::FrameRecd(&frame));
        mux.handle_channel_event(id, ChannelEvent::FrameSent { success: true });
    }
}

fn main() {
    env_logger::init();

    let mut server = Multiplexer::new(
        MuxConfig { id: "server".to_string(), ..MuxConfig::default() },
        OutboundDefaults::default(),
    );
    server.add_list_handler();
    server.add_handler(
        "Echo",
        "{message}",
        Box::new(|ri, _fi, args, mux| {
            let body = args.map(|a| a.get()).unwrap_or("null");
            mux.send_response(ri, &format!("{{\"echoed\":{}}}", body));
        }),
    );

    let mut client = Multiplexer::new(
        MuxConfig { id: "client".to_string(), ..MuxConfig::default() },
        OutboundDefaults::default(),
    );

    let server_side = LoopbackChannel::new();
    let client_side = LoopbackChannel::new();
    let server_chan_id = server.add_channel(DST_DEFAULT, client_side.clone());
    let client_chan_id = client.add_channel(DST_DEFAULT, server_side.clone());

    server.handle_channel_event(server_chan_id, ChannelEvent::Open);
    client.handle_channel_event(client_chan_id, ChannelEvent::Open);

    client.callf(
        "Echo",
        Some(Box::new(|result, code, message| {
            if code != 0 {
                eprintln!("Echo failed ({}): {:?}", code, message);
            } else {
                println!("Echo replied: {}", result.map(|r| r.get()).unwrap_or("null"));
            }
        })),
        CallOpts::default(),
        Some(r#""hello, rpc""#),
    );

    // Deliver client -> server, let the server respond, deliver the
    // response back. Frames land in the *other* party's outbox, so pump
    // with the channel each side actually registered.
    pump_through(&mut server, server_chan_id, &server_side, &mut client, client_chan_id, &client_side);
}

/// Shuttles frames back and forth until neither side's outbox has
/// anything left, since a single `Echo` round trip takes two hops.
fn pump_through(
    server: &mut Multiplexer,
    server_chan_id: ChannelId,
    server_side: &Rc<LoopbackChannel>,
    client: &mut Multiplexer,
    client_chan_id: ChannelId,
    client_side: &Rc<LoopbackChannel>,
) {
    loop {
        // `server_side`'s outbox holds frames the client sent (addressed
        // to the server); `client_side`'s holds frames the server sent.
        let from_client = !server_side.outbox.borrow().is_empty();
        let from_server = !client_side.outbox.borrow().is_empty();
        if !from_client && !from_server {
            break;
        }
        pump(server, server_chan_id, server_side);
        pump(client, client_chan_id, client_side);
    }
}
