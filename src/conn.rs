//! One buffered TCP connection to the server.
//!
//! A `Connection` is exclusively owned by a single actor for its whole
//! lifetime: the bulk loader holds one, and each benchmark worker holds its
//! own. Within a connection, reply order equals command order, so a caller
//! that pipelines must drain exactly one reply per command sent since the
//! previous flush before sending again.

use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::resp::{self, Reply};

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    encode_buf: Vec<u8>,
}

impl Connection {
    /// Establish the transport. The caller owns the connection until drop;
    /// there is no reconnect.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected");
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            encode_buf: Vec::with_capacity(128),
        })
    }

    /// Buffer one command without waiting for its reply. May be called
    /// repeatedly before `flush` to pipeline.
    pub async fn send_command(&mut self, args: &[&str]) -> Result<()> {
        self.encode_buf.clear();
        resp::encode_command(&mut self.encode_buf, args);
        self.writer.write_all(&self.encode_buf).await?;
        Ok(())
    }

    /// Force all buffered commands onto the wire. One reply per buffered
    /// command is now owed, in order.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Block until one complete reply is parsed off the stream.
    pub async fn receive_reply(&mut self) -> Result<Reply> {
        resp::read_reply(&mut self.reader).await
    }

    /// Synchronous request/reply: send, flush, read one reply.
    pub async fn do_command(&mut self, args: &[&str]) -> Result<Reply> {
        self.send_command(args).await?;
        self.flush().await?;
        self.receive_reply().await
    }
}
