//! Control server - loopback listener relaying APDUs to the emulator

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

use crate::common::{Error, Result};

use super::frame;

/// Control server bound to a local port
pub struct ControlServer {
    /// Address the listener is bound to
    local_addr: SocketAddr,
    /// Accept loop; owns the per-client tasks
    task: JoinHandle<()>,
}

impl ControlServer {
    /// Bind the listener and start accepting clients
    ///
    /// The listener is accepting connections once this returns.
    pub async fn bind(addr: SocketAddr, apdu_addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::ControlBind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Control server listening on {}", local_addr);

        let relay = Arc::new(Relay::new(apdu_addr));
        let task = tokio::spawn(accept_loop(listener, relay));

        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting clients and drop the connected ones
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, relay: Arc<Relay>) {
    // Dropping the set on abort aborts every client task with it
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        tracing::debug!("Control client connected: {}", peer);
                        let relay = relay.clone();
                        clients.spawn(async move {
                            if let Err(e) = handle_client(stream, &relay).await {
                                tracing::warn!("Control client {} dropped: {}", peer, e);
                            }
                            tracing::debug!("Control client disconnected: {}", peer);
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
        }
    }
}

/// Relay commands from one client until it disconnects
async fn handle_client(stream: TcpStream, relay: &Relay) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(apdu) = frame::read_command(&mut reader).await? {
        tracing::debug!("APDU >>> {}", hex::encode(&apdu));
        let reply = relay.exchange(&apdu).await?;
        tracing::debug!("APDU <<< {}", hex::encode(&reply[4..]));
        writer.write_all(&reply).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Single connection to the emulator's APDU port, shared by all clients
struct Relay {
    addr: SocketAddr,
    conn: Mutex<Option<BufReader<TcpStream>>>,
}

impl Relay {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            conn: Mutex::new(None),
        }
    }

    /// Forward one command and wait for the device's reply
    ///
    /// Holds the connection for the whole exchange, which lasts as long as the
    /// device waits for the user.
    async fn exchange(&self, apdu: &[u8]) -> Result<Vec<u8>> {
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            let stream = TcpStream::connect(self.addr).await?;
            stream.set_nodelay(true)?;
            *conn = Some(BufReader::new(stream));
        }
        let Some(stream) = conn.as_mut() else {
            return Err(Error::Internal("APDU connection missing".to_string()));
        };

        let result = match frame::write_command(stream.get_mut(), apdu).await {
            Ok(()) => frame::read_reply(stream).await,
            Err(e) => Err(e),
        };

        if result.is_err() {
            // Reconnect on the next exchange
            *conn = None;
        }
        result
    }
}
