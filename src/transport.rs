//! Publication boundary.
//!
//! The worker hands each encoded record to a `Transport` and never waits on it:
//! a busy or missing session drops the record. Reconnection happens only in
//! `Transport::maintain`, called from the maintenance loop.

use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Duration;

use crate::error::{NodeError, NodeResult};
use crate::power_quality::measurement::{self, MeasurementResult};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Send one record. Must not block on reconnection.
    fn publish(&self, topic: &str, payload: &str) -> NodeResult<()>;

    /// Re-establish the session if it is down.
    fn maintain(&self) -> NodeResult<()>;
}

/// Serial-echo style transport: every record goes to the log.
#[derive(Debug, Default)]
pub struct ConsoleTransport;

impl Transport for ConsoleTransport {
    fn is_connected(&self) -> bool {
        true
    }

    fn publish(&self, topic: &str, payload: &str) -> NodeResult<()> {
        log::info!("{} {}", topic, payload);
        Ok(())
    }

    fn maintain(&self) -> NodeResult<()> {
        Ok(())
    }
}

/// Newline-framed `topic SP payload LF` records to a broker bridge.
#[derive(Debug)]
pub struct TcpTransport {
    addr: String,
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
}

impl TcpTransport {
    /// No connection is made here; the first `maintain` call opens it.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn connect(&self) -> NodeResult<TcpStream> {
        let addr = self.addr.to_socket_addrs()?.next().ok_or_else(|| {
            NodeError::Transport(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve", self.addr),
            ))
        })?;

        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Transport for TcpTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn publish(&self, topic: &str, payload: &str) -> NodeResult<()> {
        let mut guard = match self.stream.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(NodeError::NotConnected),
        };

        let stream = guard.as_mut().ok_or(NodeError::NotConnected)?;
        let result = writeln!(stream, "{} {}", topic, payload).and_then(|_| stream.flush());

        if let Err(e) = result {
            *guard = None;
            self.connected.store(false, Ordering::Release);
            return Err(e.into());
        }
        Ok(())
    }

    fn maintain(&self) -> NodeResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        log::info!("Attempting broker connection to {}...", self.addr);
        let stream = self.connect()?;

        let mut guard = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(stream);
        self.connected.store(true, Ordering::Release);
        log::info!("Connected to {}", self.addr);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Dropped,
}

/// Encodes results and hands them to the transport, at most once, no queue.
pub struct Publisher {
    transport: Arc<dyn Transport>,
    topic: String,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, topic: impl Into<String>) -> Self {
        Self {
            transport,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encoding failures propagate; transport failures drop the record.
    pub fn publish(&self, result: &MeasurementResult) -> NodeResult<PublishOutcome> {
        let payload = measurement::encode(result)?;

        match self.transport.publish(&self.topic, &payload) {
            Ok(()) => Ok(PublishOutcome::Sent),
            Err(NodeError::NotConnected) => {
                log::debug!("Transport busy or disconnected, record dropped");
                Ok(PublishOutcome::Dropped)
            }
            Err(NodeError::Transport(e)) => {
                log::warn!("Publish failed, session closed: {}", e);
                Ok(PublishOutcome::Dropped)
            }
            Err(e) => Err(e),
        }
    }
}
