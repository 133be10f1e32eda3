//! Wire format for the three frame families that flow over a
//! [`TcpStream`](crate::tcp::TcpStream) connection: `Request` (client to
//! server), `Response` (server to client, RPC only) and `Push` (server to
//! subscriber).
//!
//! Each frame is encoded into a single buffer that the stream layer then
//! writes length-prefixed; this module only deals with what lives inside
//! that length prefix.

use std::io;

/// Upper bound on `protocol_len + body_len` for any frame.
pub const MAX_BUFFER_LEN: usize = 8 * 1024 * 1024;

/// Reserved protocol name used for client -> server heartbeat pings on a
/// subscriber connection.
pub const HEARTBEAT_PROTOCOL: &str = "__heartbeats__";

pub const SUBSCRIBE_BODY: &[u8] = b"1";
pub const UNSUBSCRIBE_BODY: &[u8] = b"0";

/// Selects whether a frame's body was produced by the serialization
/// collaborator or is caller-supplied raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Mode {
    Serialize = 0,
    NonSerialize = 1,
}

impl Mode {
    fn from_u32(v: u32) -> io::Result<Self> {
        match v {
            0 => Ok(Mode::Serialize),
            1 => Ok(Mode::NonSerialize),
            _ => Err(framing_error("unknown frame mode")),
        }
    }
}

/// Selects which collaborator on the server handles a request frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Kind {
    Rpc = 0,
    Publisher = 1,
    Subscriber = 2,
}

impl Kind {
    fn from_u32(v: u32) -> io::Result<Self> {
        match v {
            0 => Ok(Kind::Rpc),
            1 => Ok(Kind::Publisher),
            2 => Ok(Kind::Subscriber),
            _ => Err(framing_error("unknown frame kind")),
        }
    }
}

fn framing_error(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn check_len(protocol_len: usize, body_len: usize) -> io::Result<()> {
    let total = protocol_len + body_len;
    if total == 0 || total > MAX_BUFFER_LEN {
        return Err(framing_error("frame body exceeds max_buffer_len or is empty"));
    }
    Ok(())
}

/// `protocol_len(4) | body_len(4) | mode(4) | kind(4) | call_id(8)` = 24
/// bytes, followed by `protocol_name` then `body`.
pub const REQUEST_HEADER_SIZE: usize = 24;

#[derive(Clone, Debug)]
pub struct RequestFrame {
    pub protocol_name: String,
    pub mode: Mode,
    pub kind: Kind,
    pub call_id: u64,
    pub body: Vec<u8>,
}

impl RequestFrame {
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let name = self.protocol_name.as_bytes();
        check_len(name.len(), self.body.len())?;

        let mut out = Vec::with_capacity(REQUEST_HEADER_SIZE + name.len() + self.body.len());
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.mode as u32).to_le_bytes());
        out.extend_from_slice(&(self.kind as u32).to_le_bytes());
        out.extend_from_slice(&self.call_id.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < REQUEST_HEADER_SIZE {
            return Err(framing_error("request frame shorter than header"));
        }
        let protocol_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let body_len = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
        let mode = Mode::from_u32(u32::from_le_bytes(buf[8..12].try_into().unwrap()))?;
        let kind = Kind::from_u32(u32::from_le_bytes(buf[12..16].try_into().unwrap()))?;
        let call_id = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        check_len(protocol_len, body_len)?;

        let tail = &buf[REQUEST_HEADER_SIZE..];
        if tail.len() != protocol_len + body_len {
            return Err(framing_error("request frame length mismatch"));
        }
        let protocol_name = String::from_utf8(tail[..protocol_len].to_vec())
            .map_err(|_| framing_error("protocol name is not valid utf-8"))?;
        let body = tail[protocol_len..].to_vec();

        Ok(Self { protocol_name, mode, kind, call_id, body })
    }
}

/// `body_len(4) | call_id(8)` = 12 bytes, followed by `body`.
pub const RESPONSE_HEADER_SIZE: usize = 12;

#[derive(Clone, Debug)]
pub struct ResponseFrame {
    pub call_id: u64,
    pub body: Vec<u8>,
}

impl ResponseFrame {
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        if self.body.len() > MAX_BUFFER_LEN {
            return Err(framing_error("response body exceeds max_buffer_len"));
        }
        let mut out = Vec::with_capacity(RESPONSE_HEADER_SIZE + self.body.len());
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.call_id.to_le_bytes());
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < RESPONSE_HEADER_SIZE {
            return Err(framing_error("response frame shorter than header"));
        }
        let body_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let call_id = u64::from_le_bytes(buf[4..12].try_into().unwrap());
        let tail = &buf[RESPONSE_HEADER_SIZE..];
        if tail.len() != body_len {
            return Err(framing_error("response frame length mismatch"));
        }
        Ok(Self { call_id, body: tail.to_vec() })
    }
}

/// `protocol_len(4) | body_len(4) | mode(4)` = 12 bytes, followed by
/// `topic_name` then `body`.
pub const PUSH_HEADER_SIZE: usize = 12;

#[derive(Clone, Debug)]
pub struct PushFrame {
    pub topic_name: String,
    pub mode: Mode,
    pub body: Vec<u8>,
}

impl PushFrame {
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let name = self.topic_name.as_bytes();
        check_len(name.len(), self.body.len())?;

        let mut out = Vec::with_capacity(PUSH_HEADER_SIZE + name.len() + self.body.len());
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.mode as u32).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < PUSH_HEADER_SIZE {
            return Err(framing_error("push frame shorter than header"));
        }
        let protocol_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        let body_len = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
        let mode = Mode::from_u32(u32::from_le_bytes(buf[8..12].try_into().unwrap()))?;
        check_len(protocol_len, body_len)?;

        let tail = &buf[PUSH_HEADER_SIZE..];
        if tail.len() != protocol_len + body_len {
            return Err(framing_error("push frame length mismatch"));
        }
        let topic_name = String::from_utf8(tail[..protocol_len].to_vec())
            .map_err(|_| framing_error("topic name is not valid utf-8"))?;
        let body = tail[protocol_len..].to_vec();

        Ok(Self { topic_name, mode, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let f = RequestFrame {
            protocol_name: "echo".into(),
            mode: Mode::Serialize,
            kind: Kind::Rpc,
            call_id: 42,
            body: b"hello".to_vec(),
        };
        let bytes = f.encode().unwrap();
        let back = RequestFrame::decode(&bytes).unwrap();
        assert_eq!(back.protocol_name, "echo");
        assert_eq!(back.call_id, 42);
        assert_eq!(back.body, b"hello");
        assert_eq!(back.mode, Mode::Serialize);
        assert_eq!(back.kind, Kind::Rpc);
    }

    #[test]
    fn response_round_trip() {
        let f = ResponseFrame { call_id: 7, body: b"world".to_vec() };
        let bytes = f.encode().unwrap();
        let back = ResponseFrame::decode(&bytes).unwrap();
        assert_eq!(back.call_id, 7);
        assert_eq!(back.body, b"world");
    }

    #[test]
    fn push_round_trip() {
        let f = PushFrame { topic_name: "weather".into(), mode: Mode::Serialize, body: b"good".to_vec() };
        let bytes = f.encode().unwrap();
        let back = PushFrame::decode(&bytes).unwrap();
        assert_eq!(back.topic_name, "weather");
        assert_eq!(back.body, b"good");
    }

    #[test]
    fn rejects_oversized_frame() {
        let f = RequestFrame {
            protocol_name: "x".into(),
            mode: Mode::NonSerialize,
            kind: Kind::Rpc,
            call_id: 0,
            body: vec![0u8; MAX_BUFFER_LEN + 1],
        };
        assert!(f.encode().is_err());
    }

    #[test]
    fn rejects_empty_frame() {
        let f = RequestFrame {
            protocol_name: String::new(),
            mode: Mode::NonSerialize,
            kind: Kind::Rpc,
            call_id: 0,
            body: Vec::new(),
        };
        assert!(f.encode().is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(RequestFrame::decode(&[0u8; 4]).is_err());
    }
}
