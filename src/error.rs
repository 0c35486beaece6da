//! Error taxonomy for the protocol client and the two workloads.
//!
//! Nothing here is retried. A failure at any stage (connect, send, flush,
//! receive, reply validation) aborts the whole run and surfaces to the
//! operator; a mid-run fault invalidates the measurement anyway.

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug)]
pub enum ClientError {
    /// A run was asked for with unusable parameters, before any i/o.
    Config(String),
    /// The transport could not be established at all.
    Connect { addr: String, source: io::Error },
    /// Read or write fault mid-session, including EOF before a full reply.
    Io(io::Error),
    /// The reply framing could not be parsed.
    Protocol(String),
    /// A well-formed reply carried the wrong value. The message names
    /// expected vs. actual so the failing command can be diagnosed.
    Semantic(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            ClientError::Connect { addr, source } => {
                write!(f, "cannot connect to {addr}: {source}")
            }
            ClientError::Io(err) => write!(f, "connection i/o failed: {err}"),
            ClientError::Protocol(msg) => write!(f, "malformed reply: {msg}"),
            ClientError::Semantic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connect { source, .. } => Some(source),
            ClientError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Io(err)
    }
}
