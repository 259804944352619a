//! Raw TCP echo responder.
//!
//! Listens on the fieldbus port, logs every chunk it receives as hex and
//! writes the same bytes back. It has no register semantics: a client sees its
//! own request frame as the reply, which is enough to exercise a connect,
//! write and disconnect lifecycle against a real socket.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Maximum bytes read per exchange.
pub const READ_BUFFER_SIZE: usize = 1024;

/// One chunk received from a client and echoed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub peer: SocketAddr,
    pub bytes: Vec<u8>,
}

/// Echo server bound to a local address.
pub struct EchoServer {
    listener: TcpListener,
    exchanges: Option<mpsc::UnboundedSender<Exchange>>,
}

impl EchoServer {
    /// Bind the listening socket.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            exchanges: None,
        })
    }

    /// Also report every exchange on the returned channel.
    pub fn with_exchanges(mut self) -> (Self, mpsc::UnboundedReceiver<Exchange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.exchanges = Some(tx);
        (self, rx)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, serving each on its own task.
    pub async fn run(self) -> io::Result<()> {
        info!(addr = %self.listener.local_addr()?, "Echo server listening");

        loop {
            let (stream, peer) = self.listener.accept().await?;
            info!(%peer, "Client connected");

            let exchanges = self.exchanges.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer, exchanges).await {
                    warn!(%peer, error = %e, "Connection error");
                }
                info!(%peer, "Client disconnected");
            });
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    exchanges: Option<mpsc::UnboundedSender<Exchange>>,
) -> io::Result<()> {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            debug!(%peer, "EOF");
            return Ok(());
        }

        let bytes = &buf[..n];
        info!(%peer, len = n, data = %to_hex(bytes), "Received");

        stream.write_all(bytes).await?;

        if let Some(tx) = &exchanges {
            let _ = tx.send(Exchange {
                peer,
                bytes: bytes.to_vec(),
            });
        }
    }
}

/// Lowercase hex without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
