//! Кадры и команды TCP-протокола nsqd V2.
//!
//! Кадр сервера: `[size u32][frame type u32][data]`, где `size` учитывает
//! тип и данные. Сообщение внутри кадра типа 2:
//! `[timestamp i64][attempts u16][id 16 байт][body]`.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use nsqbridge_error::TransportError;
use serde::Serialize;

use crate::transport::{ConsumerGroup, MessageId, Topic};

/// Магическое приветствие протокола V2
pub const MAGIC_V2: &[u8; 4] = b"  V2";

pub const FRAME_TYPE_RESPONSE: u32 = 0;
pub const FRAME_TYPE_ERROR: u32 = 1;
pub const FRAME_TYPE_MESSAGE: u32 = 2;

pub const RESPONSE_OK: &[u8] = b"OK";
pub const RESPONSE_HEARTBEAT: &[u8] = b"_heartbeat_";
pub const RESPONSE_CLOSE_WAIT: &[u8] = b"CLOSE_WAIT";

/// Заголовок кадра: размер + тип
const FRAME_HEADER_LEN: usize = 8;
/// timestamp + attempts + id
const MESSAGE_HEADER_LEN: usize = 8 + 2 + 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Response(Bytes),
    Error(Bytes),
    Message(RawMessage),
}

impl Frame {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Frame::Response(data) if data.as_ref() == RESPONSE_HEARTBEAT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub timestamp: i64,
    pub attempts: u16,
    pub id: MessageId,
    pub body: Bytes,
}

/// Тело команды IDENTIFY.
#[derive(Debug, Clone, Serialize)]
pub struct Identify {
    pub client_id: String,
    pub hostname: String,
    pub user_agent: String,
    /// Миллисекунды
    pub heartbeat_interval: u64,
    pub feature_negotiation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Identify(Bytes),
    Pub { topic: &'a Topic, body: &'a [u8] },
    Sub {
        topic: &'a Topic,
        group: &'a ConsumerGroup,
    },
    Rdy(u32),
    Fin(MessageId),
    Req(MessageId, Duration),
    Nop,
    Cls,
}

impl Command<'_> {
    pub fn identify(body: &Identify) -> Result<Command<'static>, TransportError> {
        let json = serde_json::to_vec(body)
            .map_err(|e| TransportError::protocol(format!("IDENTIFY body: {e}")))?;
        Ok(Command::Identify(Bytes::from(json)))
    }

    /// Имя команды для логов и таймаутов.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Identify(_) => "IDENTIFY",
            Command::Pub { .. } => "PUB",
            Command::Sub { .. } => "SUB",
            Command::Rdy(_) => "RDY",
            Command::Fin(_) => "FIN",
            Command::Req(..) => "REQ",
            Command::Nop => "NOP",
            Command::Cls => "CLS",
        }
    }

    pub fn encode(
        &self,
        dst: &mut BytesMut,
    ) {
        match self {
            Command::Identify(body) => {
                dst.put_slice(b"IDENTIFY\n");
                put_body(dst, body);
            }
            Command::Pub { topic, body } => {
                dst.put_slice(b"PUB ");
                dst.put_slice(topic.as_bytes());
                dst.put_u8(b'\n');
                put_body(dst, body);
            }
            Command::Sub { topic, group } => {
                dst.put_slice(b"SUB ");
                dst.put_slice(topic.as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(group.as_bytes());
                dst.put_u8(b'\n');
            }
            Command::Rdy(count) => {
                dst.put_slice(format!("RDY {count}\n").as_bytes());
            }
            Command::Fin(id) => {
                dst.put_slice(b"FIN ");
                dst.put_slice(id);
                dst.put_u8(b'\n');
            }
            Command::Req(id, delay) => {
                dst.put_slice(b"REQ ");
                dst.put_slice(id);
                dst.put_slice(format!(" {}\n", delay.as_millis()).as_bytes());
            }
            Command::Nop => dst.put_slice(b"NOP\n"),
            Command::Cls => dst.put_slice(b"CLS\n"),
        }
    }
}

fn put_body(
    dst: &mut BytesMut,
    body: &[u8],
) {
    // длина тела ограничена max_frame_size задолго до u32::MAX
    dst.put_u32(body.len() as u32);
    dst.put_slice(body);
}

/// Пытается выделить из буфера один полный кадр.
///
/// `Ok(None)` означает, что данных пока недостаточно; буфер не изменяется.
pub fn decode_frame(
    buf: &mut BytesMut,
    max_frame_size: usize,
) -> Result<Option<Frame>, TransportError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if size < 4 {
        return Err(TransportError::protocol(format!(
            "frame size {size} is smaller than frame type"
        )));
    }
    if size > max_frame_size {
        return Err(TransportError::protocol(format!(
            "frame size {size} exceeds limit {max_frame_size}"
        )));
    }
    if buf.len() < 4 + size {
        buf.reserve(4 + size - buf.len());
        return Ok(None);
    }

    buf.advance(4);
    let frame_type = buf.get_u32();
    let data = buf.split_to(size - 4).freeze();

    match frame_type {
        FRAME_TYPE_RESPONSE => Ok(Some(Frame::Response(data))),
        FRAME_TYPE_ERROR => Ok(Some(Frame::Error(data))),
        FRAME_TYPE_MESSAGE => parse_message(data).map(|m| Some(Frame::Message(m))),
        other => Err(TransportError::protocol(format!(
            "unknown frame type {other}"
        ))),
    }
}

fn parse_message(mut data: Bytes) -> Result<RawMessage, TransportError> {
    if data.len() < MESSAGE_HEADER_LEN {
        return Err(TransportError::protocol(format!(
            "message frame of {} bytes is shorter than its header",
            data.len()
        )));
    }
    let timestamp = data.get_i64();
    let attempts = data.get_u16();
    let mut id = [0u8; 16];
    data.copy_to_slice(&mut id);
    Ok(RawMessage {
        timestamp,
        attempts,
        id,
        body: data,
    })
}

/// Кодирует кадр сервера. Нужен фиктивному nsqd в тестах и фаззингу.
pub fn encode_frame(
    frame: &Frame,
    dst: &mut BytesMut,
) {
    let (frame_type, len) = match frame {
        Frame::Response(d) => (FRAME_TYPE_RESPONSE, d.len()),
        Frame::Error(d) => (FRAME_TYPE_ERROR, d.len()),
        Frame::Message(m) => (FRAME_TYPE_MESSAGE, MESSAGE_HEADER_LEN + m.body.len()),
    };
    dst.reserve(FRAME_HEADER_LEN + len);
    dst.put_u32((4 + len) as u32);
    dst.put_u32(frame_type);
    match frame {
        Frame::Response(d) | Frame::Error(d) => dst.put_slice(d),
        Frame::Message(m) => {
            dst.put_i64(m.timestamp);
            dst.put_u16(m.attempts);
            dst.put_slice(&m.id);
            dst.put_slice(&m.body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf);
        buf
    }

    /// Тест проверяет разбор ответа и кадра ошибки.
    #[test]
    fn test_decode_response_and_error() {
        let mut buf = frame_bytes(&Frame::Response(Bytes::from_static(b"OK")));
        buf.extend_from_slice(&frame_bytes(&Frame::Error(Bytes::from_static(
            b"E_INVALID bad",
        ))));

        assert_eq!(
            decode_frame(&mut buf, 1024).unwrap(),
            Some(Frame::Response(Bytes::from_static(b"OK")))
        );
        assert_eq!(
            decode_frame(&mut buf, 1024).unwrap(),
            Some(Frame::Error(Bytes::from_static(b"E_INVALID bad")))
        );
        assert!(buf.is_empty());
    }

    /// Тест проверяет разбор сообщения, пришедшего по частям.
    #[test]
    fn test_decode_partial_message() {
        let msg = RawMessage {
            timestamp: 1_700_000_000_000_000_000,
            attempts: 3,
            id: *b"0123456789abcdef",
            body: Bytes::from_static(b"payload"),
        };
        let full = frame_bytes(&Frame::Message(msg.clone()));

        let mut buf = BytesMut::new();
        for chunk in full.chunks(5) {
            assert_eq!(decode_frame(&mut buf, 1024).unwrap(), None);
            buf.extend_from_slice(chunk);
        }
        assert_eq!(decode_frame(&mut buf, 1024).unwrap(), Some(Frame::Message(msg)));
    }

    /// Тест проверяет отказ на слишком большом кадре.
    #[test]
    fn test_frame_size_limit() {
        let mut buf = BytesMut::from(&[0u8, 0, 1, 0, 0, 0, 0, 0][..]);
        assert!(matches!(
            decode_frame(&mut buf, 128),
            Err(TransportError::Protocol { .. })
        ));
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 4, 0, 0, 0, 9][..]);
        assert!(decode_frame(&mut buf, 128).is_err());
    }

    #[test]
    fn test_heartbeat_detection() {
        assert!(Frame::Response(Bytes::from_static(RESPONSE_HEARTBEAT)).is_heartbeat());
        assert!(!Frame::Response(Bytes::from_static(RESPONSE_OK)).is_heartbeat());
    }

    /// Тест проверяет текстовое представление команд.
    #[test]
    fn test_encode_commands() {
        let topic = Topic::new("test").unwrap();
        let group = ConsumerGroup::new("messenger").unwrap();
        let id = *b"0123456789abcdef";

        let cases: Vec<(Command<'_>, &[u8])> = vec![
            (
                Command::Sub {
                    topic: &topic,
                    group: &group,
                },
                &b"SUB test messenger\n"[..],
            ),
            (Command::Rdy(1), &b"RDY 1\n"[..]),
            (Command::Fin(id), &b"FIN 0123456789abcdef\n"[..]),
            (
                Command::Req(id, Duration::from_millis(1500)),
                &b"REQ 0123456789abcdef 1500\n"[..],
            ),
            (Command::Nop, &b"NOP\n"[..]),
            (Command::Cls, &b"CLS\n"[..]),
        ];
        for (cmd, expected) in cases {
            let mut buf = BytesMut::new();
            cmd.encode(&mut buf);
            assert_eq!(&buf[..], expected, "{}", cmd.name());
        }

        let mut buf = BytesMut::new();
        Command::Pub {
            topic: &topic,
            body: b"abc",
        }
        .encode(&mut buf);
        assert_eq!(&buf[..], b"PUB test\n\x00\x00\x00\x03abc");
    }

    #[test]
    fn test_identify_json() {
        let cmd = Command::identify(&Identify {
            client_id: "c".into(),
            hostname: "h".into(),
            user_agent: "nsqbridge/0.1.0".into(),
            heartbeat_interval: 30_000,
            feature_negotiation: false,
        })
        .unwrap();
        let mut buf = BytesMut::new();
        cmd.encode(&mut buf);
        assert!(buf.starts_with(b"IDENTIFY\n"));
        let body: serde_json::Value = serde_json::from_slice(&buf[13..]).unwrap();
        assert_eq!(body["heartbeat_interval"], 30_000);
        assert_eq!(body["feature_negotiation"], false);
    }
}
