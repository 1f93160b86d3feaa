//! A websocket carrying [`BusMessage`] text frames, used by both ends.
//!
//! Reads block for at most the read timeout so the owning loop can get on with
//! its timers.  A close from the peer is not an error: [`BusSocket::is_connected`]
//! goes false and the loop winds down.
use std::{
    io::ErrorKind,
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, warn};
use simple_error::bail;
use tungstenite::{client, Error, Message, WebSocket};
use url::Url;

use crate::common::{box_error::BoxError, bus_message::BusMessage};

pub struct BusSocket {
    sock: WebSocket<TcpStream>,
    connected: bool,
}

impl BusSocket {
    /// Client side.  Only plain `ws://` urls.
    pub fn connect(url: &str, read_timeout: Duration) -> Result<BusSocket, BoxError> {
        let url = Url::parse(url)?;
        if url.scheme() != "ws" {
            bail!("unsupported scheme '{}', only ws:// is handled", url.scheme());
        }
        let host = match url.host_str() {
            Some(h) => h,
            None => bail!("no host in {}", url),
        };
        let port = url.port_or_known_default().unwrap_or(80);
        let mut stream = None;
        for addr in (host, port).to_socket_addrs()? {
            debug!("trying {} at {}", url, addr);
            match TcpStream::connect(addr) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => warn!("cannot connect to {}: {}", addr, e),
            }
        }
        let stream = match stream {
            Some(s) => s,
            None => bail!("unable to connect to {}", url),
        };
        stream.set_nodelay(true)?;
        let (sock, _resp) = client::client(url, stream).map_err(|e| format!("handshake failed: {}", e))?;
        BusSocket::ready(sock, read_timeout)
    }

    /// Server side, on a freshly accepted stream
    pub fn accept(stream: TcpStream, read_timeout: Duration) -> Result<BusSocket, BoxError> {
        stream.set_nodelay(true)?;
        let sock = tungstenite::accept(stream).map_err(|e| format!("handshake failed: {}", e))?;
        BusSocket::ready(sock, read_timeout)
    }

    // blocking handshake first, then short reads
    fn ready(sock: WebSocket<TcpStream>, read_timeout: Duration) -> Result<BusSocket, BoxError> {
        sock.get_ref().set_read_timeout(Some(read_timeout))?;
        Ok(BusSocket {
            sock,
            connected: true,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn send(&mut self, msg: &BusMessage) -> Result<(), BoxError> {
        self.sock.write_message(Message::Text(msg.to_text()?))?;
        Ok(())
    }

    /// Next decoded message, or None when the read timed out or the frame was
    /// not one of ours.
    pub fn get_message(&mut self) -> Result<Option<BusMessage>, BoxError> {
        match self.sock.read_message() {
            Ok(Message::Text(text)) => match BusMessage::from_text(&text) {
                Ok(msg) => Ok(Some(msg)),
                Err(e) => {
                    debug!("dropping '{}': {}", text, e);
                    Ok(None)
                }
            },
            Ok(Message::Close(_)) => {
                self.connected = false;
                Ok(None)
            }
            Ok(_) => Ok(None),
            Err(Error::Io(e)) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(Error::ConnectionClosed) | Err(Error::AlreadyClosed) => {
                self.connected = false;
                Ok(None)
            }
            Err(e) => {
                self.connected = false;
                Err(e.into())
            }
        }
    }

    pub fn close(&mut self) -> () {
        if self.connected {
            if let Err(e) = self.sock.close(None) {
                debug!("close: {}", e);
            }
            // let the close handshake go out
            let _ = self.sock.write_pending();
            self.connected = false;
        }
    }
}

#[cfg(test)]
mod test_bus_socket {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn only_plain_websockets() {
        assert!(BusSocket::connect("wss://localhost:3000", Duration::from_millis(1)).is_err());
        assert!(BusSocket::connect("not a url", Duration::from_millis(1)).is_err());
    }

    #[test]
    fn messages_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut sock = BusSocket::accept(stream, Duration::from_millis(5)).unwrap();
            loop {
                if let Some(BusMessage::SyncRequest(t1)) = sock.get_message().unwrap() {
                    sock.send(&BusMessage::SyncReply([t1, 2.0, 3.0])).unwrap();
                    break;
                }
            }
            while sock.is_connected() {
                let _ = sock.get_message();
            }
        });

        let url = format!("ws://127.0.0.1:{}", port);
        let mut sock = BusSocket::connect(&url, Duration::from_millis(5)).unwrap();
        sock.send(&BusMessage::SyncRequest(1.0)).unwrap();
        let reply = loop {
            if let Some(msg) = sock.get_message().unwrap() {
                break msg;
            }
        };
        assert_eq!(reply, BusMessage::SyncReply([1.0, 2.0, 3.0]));
        sock.close();
        assert!(!sock.is_connected());
        server.join().unwrap();
    }
}
