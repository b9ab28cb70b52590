//! TCP Server
//!
//! Accepts connections and runs each one on its own worker thread.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use crate::protocol::{write_response, Response};

use super::Connection;

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Live connections, so shutdown can unblock their reads
type ConnectionRegistry = Arc<Mutex<HashMap<u64, TcpStream>>>;

/// TCP server for BlockKV
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    connections: ConnectionRegistry,
    next_id: AtomicU64,
}

impl Server {
    /// Bind the listen address from `config`
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            engine,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops [`Server::run`] when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Accept connections until shutdown, then wait for every worker
    pub fn run(&self) -> Result<()> {
        let workers = WaitGroup::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.dispatch(stream, addr, workers.clone()) {
                        tracing::warn!("Failed to start worker for {}: {}", addr, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        let live = {
            let connections = self.connections.lock();
            for stream in connections.values() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            connections.len()
        };
        tracing::info!("Shutting down, waiting for {} connection(s)", live);
        workers.wait();

        Ok(())
    }

    /// Hand a new connection to its own worker thread
    fn dispatch(&self, stream: TcpStream, addr: SocketAddr, worker: WaitGroup) -> Result<()> {
        stream.set_nonblocking(false)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut connections = self.connections.lock();
            if connections.len() >= self.config.max_connections {
                drop(connections);
                tracing::warn!("Rejecting {}: connection limit reached", addr);
                let mut stream = stream;
                let _ = write_response(&mut stream, &Response::error("Too many connections."));
                return Ok(());
            }
            connections.insert(id, stream.try_clone()?);
        }

        let slot = RegistrySlot {
            id,
            connections: Arc::clone(&self.connections),
        };
        let engine = Arc::clone(&self.engine);
        let (read_ms, write_ms) = (self.config.read_timeout_ms, self.config.write_timeout_ms);

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", id))
            .spawn(move || {
                let _slot = slot;
                let _worker = worker;
                let result = Connection::new(stream, engine).and_then(|mut conn| {
                    conn.set_timeouts(read_ms, write_ms)?;
                    conn.handle()
                });
                if let Err(e) = result {
                    tracing::warn!("Connection {} from {} ended with error: {}", id, addr, e);
                }
            });

        if let Err(e) = spawned {
            self.connections.lock().remove(&id);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Removes a connection from the registry when its worker exits
struct RegistrySlot {
    id: u64,
    connections: ConnectionRegistry,
}

impl Drop for RegistrySlot {
    fn drop(&mut self) {
        self.connections.lock().remove(&self.id);
    }
}
