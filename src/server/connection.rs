//! Websocket connections to the click server.
//!
//! One thread per connection.  The thread reads frames with a short timeout,
//! forwards decoded messages to the coordinator and drains its outbound queue
//! onto the socket.  Sync requests are answered right here: the protocol is
//! stateless on the server side and stamping T2/T3 next to the socket keeps
//! queueing time out of the measurement.
use std::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::common::{
    box_error::BoxError,
    bus_message::BusMessage,
    bus_socket::BusSocket,
    clock::{micros_to_secs, Clock},
    clock_sync::sync_reply,
    event_bus::{ConnId, Inbound},
};

/// how long a read blocks before the outbound queue is checked
const READ_TIMEOUT: Duration = Duration::from_millis(2);

/// Bind the port and spawn the accept thread
pub fn listen<C>(port: u16, clock: C, inbound_tx: mpsc::Sender<Inbound>) -> Result<JoinHandle<()>, BoxError>
where
    C: Clock + Clone + Send + 'static,
{
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    let handle = thread::spawn(move || {
        let mut next_id: ConnId = 1;
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let conn = next_id;
                    next_id += 1;
                    let clock = clock.clone();
                    let tx = inbound_tx.clone();
                    thread::spawn(move || connection_thread(conn, stream, clock, tx));
                }
                Err(e) => warn!("accept failed: {}", e),
            }
        }
    });
    Ok(handle)
}

fn connection_thread<C: Clock>(conn: ConnId, stream: TcpStream, clock: C, inbound_tx: mpsc::Sender<Inbound>) -> () {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| String::from("unknown"));
    info!("connection {} from {}", conn, peer);
    match serve(conn, stream, &clock, &inbound_tx) {
        Ok(()) => debug!("connection {} closed", conn),
        Err(e) => warn!("connection {} ended: {}", conn, e),
    }
    if inbound_tx.send(Inbound::Disconnected(conn)).is_err() {
        error!("coordinator is gone");
    }
}

fn serve<C: Clock>(conn: ConnId, stream: TcpStream, clock: &C, inbound_tx: &mpsc::Sender<Inbound>) -> Result<(), BoxError> {
    let mut sock = BusSocket::accept(stream, READ_TIMEOUT)?;

    let (out_tx, out_rx) = mpsc::channel();
    inbound_tx
        .send(Inbound::Connected(conn, out_tx))
        .map_err(|_| "coordinator is gone")?;

    while sock.is_connected() {
        if let Some(msg) = sock.get_message()? {
            let received_at = clock.now_micros();
            match msg {
                BusMessage::SyncRequest(t1) => {
                    let reply = sync_reply(t1, micros_to_secs(received_at), clock.now_secs());
                    sock.send(&BusMessage::SyncReply(reply))?;
                }
                msg => inbound_tx
                    .send(Inbound::Message {
                        conn,
                        msg,
                        received_at,
                    })
                    .map_err(|_| "coordinator is gone")?,
            }
        }

        for msg in out_rx.try_iter() {
            sock.send(&msg)?;
        }
    }
    Ok(())
}
