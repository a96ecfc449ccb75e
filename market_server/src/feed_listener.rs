use crate::engine::MarketEngine;
use crate::hub::SubscriberSink;
use log::{debug, error, info};
use market_common::Result;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A feed subscriber connected over TCP.
///
/// Writes are serialized through a mutex and bounded by the stream's write
/// timeout, so a stalled peer fails the write instead of blocking the caller
/// indefinitely.
pub struct TcpSubscriber {
    stream: Mutex<TcpStream>,
    peer: String,
}

impl TcpSubscriber {
    pub fn new(stream: TcpStream, write_deadline: Duration) -> io::Result<Self> {
        stream.set_write_timeout(Some(write_deadline))?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?.to_string();
        Ok(Self {
            stream: Mutex::new(stream),
            peer,
        })
    }
}

impl SubscriberSink for TcpSubscriber {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        let mut stream = self
            .stream
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        stream.write_all(frame)?;
        stream.flush()
    }

    fn close(&self) {
        if let Ok(stream) = self.stream.lock() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn describe(&self) -> String {
        self.peer.clone()
    }
}

/// Accepts feed subscribers and watches their inbound side for liveness.
pub struct FeedListener {
    socket: TcpListener,
}

impl FeedListener {
    pub fn new(bind_addr: &str) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Run the accept loop on a background thread.
    pub fn start(self, engine: Arc<MarketEngine>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            if let Err(e) = self.accept_loop(engine) {
                error!("Feed listener stopped: {}", e);
            }
        })
    }

    fn accept_loop(self, engine: Arc<MarketEngine>) -> Result<()> {
        info!("Feed TCP server is started on {}", self.socket.local_addr()?);
        let write_deadline = engine.config().write_deadline();
        let read_deadline = engine.config().read_deadline();

        for stream in self.socket.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Feed connection error: {}", e);
                    continue;
                }
            };
            if let Err(e) = Self::admit(&engine, stream, write_deadline, read_deadline) {
                error!("Failed to admit subscriber: {}", e);
            }
        }
        Ok(())
    }

    fn admit(
        engine: &Arc<MarketEngine>,
        stream: TcpStream,
        write_deadline: Duration,
        read_deadline: Duration,
    ) -> Result<()> {
        let reader = stream.try_clone()?;
        reader.set_read_timeout(Some(read_deadline))?;
        let sink = Arc::new(TcpSubscriber::new(stream, write_deadline)?);
        let id = engine.subscribe(sink)?;

        let engine = Arc::clone(engine);
        thread::spawn(move || {
            let hub = &engine.market().hub;
            for line in BufReader::new(reader).lines() {
                match line {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            hub.touch(id);
                        }
                    }
                    Err(e) => {
                        debug!("Subscriber {} read ended: {}", id, e);
                        break;
                    }
                }
            }
            hub.unsubscribe(id);
        });
        Ok(())
    }
}
