//! Wire codec for the server's request/reply protocol.
//!
//! Requests are arrays of bulk strings. Replies are one of: a status line
//! (`+`), an error line (`-`), an integer (`:`), a bulk string (`$`, with
//! `-1` meaning nil), or an array (`*`) of further replies. Replies on one
//! connection arrive in submission order; the codec itself is stateless.

use std::future::Future;
use std::io;
use std::pin::Pin;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{ClientError, Result};

/// One parsed reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(String),
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    /// Interpret a bulk reply as a JSON document. The server answers query
    /// and statistics commands with JSON bodies once the session is in JSON
    /// output mode.
    pub fn into_json(self) -> Result<Value> {
        match self {
            Reply::Bulk(body) => serde_json::from_str(&body)
                .map_err(|err| ClientError::Protocol(format!("invalid json body: {err}"))),
            other => Err(ClientError::Semantic(format!(
                "expected a json body, got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Simple(s) => write!(f, "{s}"),
            Reply::Error(msg) => write!(f, "(error) {msg}"),
            Reply::Integer(n) => write!(f, "(integer) {n}"),
            Reply::Bulk(s) => write!(f, "{s}"),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Array(items) => write!(f, "(array len {})", items.len()),
        }
    }
}

/// Append one command to `buf` as an array of bulk strings.
pub fn encode_command(buf: &mut Vec<u8>, args: &[&str]) {
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
}

/// Parse exactly one reply off `reader`, blocking until it is complete.
///
/// EOF or a stream fault before the reply completes is an i/o error;
/// unparseable framing is a protocol error.
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply>
where
    R: AsyncBufRead + Unpin + Send,
{
    read_value(reader).await
}

// Arrays nest, so the parser recurses through a boxed future.
fn read_value<'a, R>(reader: &'a mut R) -> Pin<Box<dyn Future<Output = Result<Reply>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line(reader).await?;
        let (prefix, rest) = match line.as_bytes().first() {
            Some(&b) => (b, &line[1..]),
            None => return Err(ClientError::Protocol("empty reply line".into())),
        };
        match prefix {
            b'+' => Ok(Reply::Simple(rest.to_string())),
            b'-' => Ok(Reply::Error(rest.to_string())),
            b':' => rest
                .parse::<i64>()
                .map(Reply::Integer)
                .map_err(|_| ClientError::Protocol(format!("bad integer reply '{rest}'"))),
            b'$' => {
                let len = parse_len(rest)?;
                let Some(len) = len else { return Ok(Reply::Nil) };
                let mut body = vec![0u8; len + 2];
                reader.read_exact(&mut body).await?;
                if &body[len..] != b"\r\n" {
                    return Err(ClientError::Protocol("bulk reply missing crlf".into()));
                }
                body.truncate(len);
                String::from_utf8(body)
                    .map(Reply::Bulk)
                    .map_err(|_| ClientError::Protocol("bulk reply is not utf-8".into()))
            }
            b'*' => {
                let len = parse_len(rest)?;
                let Some(len) = len else { return Ok(Reply::Nil) };
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(read_value(reader).await?);
                }
                Ok(Reply::Array(items))
            }
            other => Err(ClientError::Protocol(format!(
                "unexpected reply prefix {:?}",
                other as char
            ))),
        }
    })
}

/// Read one crlf-terminated line, without the terminator.
async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 || !line.ends_with('\n') {
        return Err(ClientError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed before a full reply arrived",
        )));
    }
    line.pop();
    if line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

fn parse_len(digits: &str) -> Result<Option<usize>> {
    let len = digits
        .parse::<i64>()
        .map_err(|_| ClientError::Protocol(format!("bad length '{digits}'")))?;
    match len {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as usize)),
        n => Err(ClientError::Protocol(format!("negative length {n}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn parse(input: &[u8]) -> Result<Reply> {
        let mut reader = BufReader::new(input);
        read_reply(&mut reader).await
    }

    #[test]
    fn encodes_commands_as_bulk_string_arrays() {
        let mut buf = Vec::new();
        encode_command(&mut buf, &["SET", "geonames", "a1", "POINT", "33.5", "-112.2"]);
        assert_eq!(
            buf,
            b"*6\r\n$3\r\nSET\r\n$8\r\ngeonames\r\n$2\r\na1\r\n$5\r\nPOINT\r\n$4\r\n33.5\r\n$6\r\n-112.2\r\n"
        );
    }

    #[tokio::test]
    async fn parses_status_error_and_integer() {
        assert_eq!(parse(b"+OK\r\n").await.unwrap(), Reply::Simple("OK".into()));
        assert_eq!(
            parse(b"-ERR key not found\r\n").await.unwrap(),
            Reply::Error("ERR key not found".into())
        );
        assert_eq!(parse(b":42\r\n").await.unwrap(), Reply::Integer(42));
    }

    #[tokio::test]
    async fn parses_bulk_nil_and_array() {
        assert_eq!(
            parse(b"$5\r\nhello\r\n").await.unwrap(),
            Reply::Bulk("hello".into())
        );
        assert_eq!(parse(b"$-1\r\n").await.unwrap(), Reply::Nil);
        assert_eq!(
            parse(b"*2\r\n$3\r\nfoo\r\n:7\r\n").await.unwrap(),
            Reply::Array(vec![Reply::Bulk("foo".into()), Reply::Integer(7)])
        );
    }

    #[tokio::test]
    async fn truncated_reply_is_an_io_error() {
        let err = parse(b"$10\r\nhel").await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unknown_prefix_is_a_protocol_error() {
        let err = parse(b"?what\r\n").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn bulk_json_replies_decode() {
        let reply = parse(b"$17\r\n{\"ok\":true,\"n\":3}\r\n").await.unwrap();
        let body = reply.into_json().unwrap();
        assert_eq!(body["ok"], serde_json::json!(true));
        assert_eq!(body["n"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn non_bulk_reply_refuses_json_decode() {
        let err = Reply::Simple("OK".into()).into_json().unwrap_err();
        assert!(matches!(err, ClientError::Semantic(_)));
    }
}
