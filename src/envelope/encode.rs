use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use nsqbridge_error::EncodeError;

use super::{
    tags::{
        MAX_DEPTH, TAG_ARRAY, TAG_BLOB, TAG_BOOL, TAG_FLOAT, TAG_INT, TAG_MAP, TAG_NULL, TAG_STR,
    },
    Value,
};

/// Кодирует значение в один конверт.
pub fn encode(v: &Value) -> Result<Bytes, EncodeError> {
    let mut w = BytesMut::with_capacity(size_hint(v)).writer();
    write_value(&mut w, v)?;
    Ok(w.into_inner().freeze())
}

/// Запись Value в поток.
///
/// Все проверки (длины, глубина) выполняются по ходу записи; при ошибке в
/// `w` может остаться частично записанный конверт.
pub fn write_value<W: Write>(
    w: &mut W,
    v: &Value,
) -> Result<(), EncodeError> {
    write_inner(w, v, 0)
}

fn write_inner<W: Write>(
    w: &mut W,
    v: &Value,
    depth: usize,
) -> Result<(), EncodeError> {
    match v {
        Value::Null => w.write_u8(TAG_NULL)?,
        Value::Bool(b) => {
            w.write_u8(TAG_BOOL)?;
            w.write_u8(u8::from(*b))?;
        }
        Value::Int(i) => {
            w.write_u8(TAG_INT)?;
            w.write_i64::<BigEndian>(*i)?;
        }
        Value::Float(f) => {
            w.write_u8(TAG_FLOAT)?;
            // через биты, чтобы NaN сохранял полезную нагрузку
            w.write_u64::<BigEndian>(f.to_bits())?;
        }
        Value::Str(s) => {
            w.write_u8(TAG_STR)?;
            write_len(w, "text", s.len())?;
            w.write_all(s.as_bytes())?;
        }
        Value::Blob(b) => {
            w.write_u8(TAG_BLOB)?;
            write_len(w, "blob", b.len())?;
            w.write_all(b)?;
        }
        Value::Map(map) => {
            check_depth(depth)?;
            w.write_u8(TAG_MAP)?;
            write_len(w, "map", map.len())?;
            for (key, val) in map.iter() {
                write_len(w, "map key", key.len())?;
                w.write_all(key.as_bytes())?;
                write_inner(w, val, depth + 1)?;
            }
        }
        Value::Array(items) => {
            check_depth(depth)?;
            w.write_u8(TAG_ARRAY)?;
            write_len(w, "array", items.len())?;
            for item in items {
                write_inner(w, item, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn write_len<W: Write>(
    w: &mut W,
    what: &'static str,
    len: usize,
) -> Result<(), EncodeError> {
    let len32 = u32::try_from(len).map_err(|_| EncodeError::TooLarge { what, len })?;
    w.write_u32::<BigEndian>(len32)?;
    Ok(())
}

fn check_depth(depth: usize) -> Result<(), EncodeError> {
    if depth >= MAX_DEPTH {
        return Err(EncodeError::DepthLimit { max: MAX_DEPTH });
    }
    Ok(())
}

/// Грубая оценка размера для предварительного выделения буфера.
fn size_hint(v: &Value) -> usize {
    match v {
        Value::Null => 1,
        Value::Bool(_) => 2,
        Value::Int(_) | Value::Float(_) => 9,
        Value::Str(s) => 5 + s.len(),
        Value::Blob(b) => 5 + b.len(),
        Value::Map(m) => 5 + m.len() * 16,
        Value::Array(a) => 5 + a.len() * 9,
    }
}
