//! PostgreSQL v3 message framing. Only the handful of frontend messages a
//! libpq-family client actually sends, and the backend messages we answer
//! with. Every result column is TEXT; clients parse from there.

use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Startup code for protocol 3.0.
pub const PROTOCOL_VERSION: i32 = 196608;
/// Startup code for an SSLRequest probe.
pub const SSL_REQUEST: i32 = 80877103;
/// Startup code for a CancelRequest.
pub const CANCEL_REQUEST: i32 = 80877102;

/// Type oid for TEXT. The only oid this server ever reports.
pub const TEXT_OID: i32 = 25;

/// Hard cap on any single frame; a longer length prefix is a broken or
/// hostile peer.
pub const MAX_MESSAGE_LEN: usize = 1 << 20;
/// Startup packets are tiny (key/value pairs only); postgres caps at 10000.
pub const MAX_STARTUP_LEN: usize = 10_000;

// ── Frontend messages ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    Password(String),
    Query(String),
    Parse {
        name: String,
        query: String,
    },
    Bind {
        portal: String,
        statement: String,
        params: Vec<Option<Vec<u8>>>,
    },
    /// `kind` is `b'S'` (statement) or `b'P'` (portal).
    Describe {
        kind: u8,
        name: String,
    },
    Execute {
        portal: String,
    },
    Close {
        kind: u8,
        name: String,
    },
    Flush,
    Sync,
    Terminate,
}

// ── Backend messages ─────────────────────────────────────────────

#[derive(Debug)]
pub enum BackendMessage {
    AuthCleartextPassword,
    AuthOk,
    ParameterStatus {
        name: &'static str,
        value: &'static str,
    },
    BackendKeyData {
        pid: u32,
        secret: u32,
    },
    /// Always reports idle; there are no transactions.
    ReadyForQuery,
    RowDescription {
        columns: &'static [&'static str],
    },
    DataRow {
        values: Vec<Option<String>>,
    },
    CommandComplete {
        tag: String,
    },
    EmptyQueryResponse,
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    /// All parameters are described as TEXT.
    ParameterDescription {
        count: usize,
    },
    Error {
        code: &'static str,
        message: String,
    },
    Notification {
        pid: u32,
        channel: String,
        payload: String,
    },
}

// ── Codec ────────────────────────────────────────────────────────

/// Framing for the post-startup phase. The startup packet has no tag byte
/// and is read directly off the socket before the codec takes over.
#[derive(Debug, Default)]
pub struct PgCodec;

impl Decoder for PgCodec {
    type Item = FrontendMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FrontendMessage>, io::Error> {
        if src.len() < 5 {
            return Ok(None);
        }
        let tag = src[0];
        let len = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if len < 4 || len as usize > MAX_MESSAGE_LEN {
            return Err(proto_err(format!("frame length {len} out of range")));
        }
        let total = 1 + len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let frame = src.split_to(total);
        let mut body = &frame[5..];

        let msg = match tag {
            b'p' => FrontendMessage::Password(read_cstr(&mut body)?),
            b'Q' => FrontendMessage::Query(read_cstr(&mut body)?),
            b'P' => {
                let name = read_cstr(&mut body)?;
                let query = read_cstr(&mut body)?;
                // Declared parameter oids are irrelevant; everything is text.
                FrontendMessage::Parse { name, query }
            }
            b'B' => decode_bind(&mut body)?,
            b'D' => FrontendMessage::Describe {
                kind: read_u8(&mut body)?,
                name: read_cstr(&mut body)?,
            },
            b'E' => FrontendMessage::Execute {
                portal: read_cstr(&mut body)?,
            },
            b'C' => FrontendMessage::Close {
                kind: read_u8(&mut body)?,
                name: read_cstr(&mut body)?,
            },
            b'H' => FrontendMessage::Flush,
            b'S' => FrontendMessage::Sync,
            b'X' => FrontendMessage::Terminate,
            other => {
                return Err(proto_err(format!(
                    "unsupported frontend message '{}'",
                    other as char
                )));
            }
        };
        Ok(Some(msg))
    }
}

fn decode_bind(body: &mut &[u8]) -> io::Result<FrontendMessage> {
    let portal = read_cstr(body)?;
    let statement = read_cstr(body)?;
    // Parameter format codes are skipped: text and binary are byte-identical
    // for TEXT, the only type we describe.
    let fmt_count = read_i16(body)?;
    for _ in 0..fmt_count {
        read_i16(body)?;
    }
    let param_count = read_i16(body)?;
    if param_count < 0 {
        return Err(proto_err("negative parameter count".to_string()));
    }
    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        let len = read_i32(body)?;
        if len < 0 {
            params.push(None);
        } else {
            let len = len as usize;
            if body.len() < len {
                return Err(proto_err("truncated bind parameter".to_string()));
            }
            params.push(Some(body[..len].to_vec()));
            *body = &body[len..];
        }
    }
    Ok(FrontendMessage::Bind {
        portal,
        statement,
        params,
    })
}

impl Encoder<BackendMessage> for PgCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: BackendMessage, dst: &mut BytesMut) -> io::Result<()> {
        match msg {
            BackendMessage::AuthCleartextPassword => frame(dst, b'R', |b| b.put_i32(3)),
            BackendMessage::AuthOk => frame(dst, b'R', |b| b.put_i32(0)),
            BackendMessage::ParameterStatus { name, value } => frame(dst, b'S', |b| {
                put_cstr(b, name);
                put_cstr(b, value);
            }),
            BackendMessage::BackendKeyData { pid, secret } => frame(dst, b'K', |b| {
                b.put_u32(pid);
                b.put_u32(secret);
            }),
            BackendMessage::ReadyForQuery => frame(dst, b'Z', |b| b.put_u8(b'I')),
            BackendMessage::RowDescription { columns } => frame(dst, b'T', |b| {
                b.put_i16(columns.len() as i16);
                for name in columns {
                    put_cstr(b, name);
                    b.put_i32(0); // table oid
                    b.put_i16(0); // attribute number
                    b.put_i32(TEXT_OID);
                    b.put_i16(-1); // typlen: varlena
                    b.put_i32(-1); // typmod
                    b.put_i16(0); // text format
                }
            }),
            BackendMessage::DataRow { values } => frame(dst, b'D', |b| {
                b.put_i16(values.len() as i16);
                for value in &values {
                    match value {
                        Some(text) => {
                            b.put_i32(text.len() as i32);
                            b.extend_from_slice(text.as_bytes());
                        }
                        None => b.put_i32(-1),
                    }
                }
            }),
            BackendMessage::CommandComplete { tag } => frame(dst, b'C', |b| put_cstr(b, &tag)),
            BackendMessage::EmptyQueryResponse => frame(dst, b'I', |_| {}),
            BackendMessage::ParseComplete => frame(dst, b'1', |_| {}),
            BackendMessage::BindComplete => frame(dst, b'2', |_| {}),
            BackendMessage::CloseComplete => frame(dst, b'3', |_| {}),
            BackendMessage::NoData => frame(dst, b'n', |_| {}),
            BackendMessage::ParameterDescription { count } => frame(dst, b't', |b| {
                b.put_i16(count as i16);
                for _ in 0..count {
                    b.put_i32(TEXT_OID);
                }
            }),
            BackendMessage::Error { code, message } => frame(dst, b'E', |b| {
                b.put_u8(b'S');
                put_cstr(b, "ERROR");
                b.put_u8(b'V');
                put_cstr(b, "ERROR");
                b.put_u8(b'C');
                put_cstr(b, code);
                b.put_u8(b'M');
                put_cstr(b, &message);
                b.put_u8(0);
            }),
            BackendMessage::Notification {
                pid,
                channel,
                payload,
            } => frame(dst, b'A', |b| {
                b.put_i32(pid as i32);
                put_cstr(b, &channel);
                put_cstr(b, &payload);
            }),
        }
        Ok(())
    }
}

/// Write one tagged frame, backpatching the length prefix once the body is
/// in place. The length counts itself but not the tag.
fn frame(dst: &mut BytesMut, tag: u8, body: impl FnOnce(&mut BytesMut)) {
    dst.put_u8(tag);
    let len_at = dst.len();
    dst.put_i32(0);
    body(dst);
    let len = (dst.len() - len_at) as i32;
    dst[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
}

fn put_cstr(dst: &mut BytesMut, s: &str) {
    dst.extend_from_slice(s.as_bytes());
    dst.put_u8(0);
}

fn read_u8(buf: &mut &[u8]) -> io::Result<u8> {
    let Some((&first, rest)) = buf.split_first() else {
        return Err(proto_err("truncated message".to_string()));
    };
    *buf = rest;
    Ok(first)
}

fn read_i16(buf: &mut &[u8]) -> io::Result<i16> {
    if buf.len() < 2 {
        return Err(proto_err("truncated message".to_string()));
    }
    let v = i16::from_be_bytes([buf[0], buf[1]]);
    *buf = &buf[2..];
    Ok(v)
}

fn read_i32(buf: &mut &[u8]) -> io::Result<i32> {
    if buf.len() < 4 {
        return Err(proto_err("truncated message".to_string()));
    }
    let v = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(v)
}

fn read_cstr(buf: &mut &[u8]) -> io::Result<String> {
    let Some(end) = buf.iter().position(|&b| b == 0) else {
        return Err(proto_err("unterminated string".to_string()));
    };
    let s = std::str::from_utf8(&buf[..end])
        .map_err(|_| proto_err("string is not utf8".to_string()))?
        .to_string();
    *buf = &buf[end + 1..];
    Ok(s)
}

fn proto_err(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
