//! Декодирование конверта в [`Value`].
//!
//! Каждое значение начинается с однобайтового тега, за которым следуют длина
//! (для строк, блобов и контейнеров) и данные. Декодер никогда не приводит
//! типы молча: любое отклонение от раскладки возвращает [`DecodeError`].

use std::collections::HashSet;
use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use nsqbridge_error::DecodeError;

use super::{
    tags::{
        MAX_DEPTH, TAG_ARRAY, TAG_BLOB, TAG_BOOL, TAG_FLOAT, TAG_INT, TAG_MAP, TAG_NULL, TAG_STR,
    },
    Value, ValueMap,
};

/// Верхняя граница предварительного выделения под элементы контейнера;
/// заявленный счётчик берётся из недоверенных данных.
const PREALLOC_LIMIT: usize = 1024;

/// Декодирует ровно один конверт из буфера.
///
/// Пустой буфер считается `null`. Байты после полного значения дают
/// [`DecodeError::TrailingBytes`].
pub fn decode(buf: &[u8]) -> Result<Value, DecodeError> {
    if buf.is_empty() {
        return Ok(Value::Null);
    }
    let mut cursor = buf;
    let value = read_value(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(DecodeError::TrailingBytes {
            count: cursor.len(),
        });
    }
    Ok(value)
}

/// Десериализует одно значение из потока.
pub fn read_value<R: Read>(r: &mut R) -> Result<Value, DecodeError> {
    read_inner(r, 0)
}

fn read_inner<R: Read>(
    r: &mut R,
    depth: usize,
) -> Result<Value, DecodeError> {
    let tag = r.read_u8()?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => match r.read_u8()? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(DecodeError::InvalidBool(other)),
        },
        TAG_INT => Ok(Value::Int(r.read_i64::<BigEndian>()?)),
        TAG_FLOAT => Ok(Value::Float(f64::from_bits(r.read_u64::<BigEndian>()?))),
        TAG_STR => Ok(Value::Str(read_string(r)?)),
        TAG_BLOB => {
            let len = r.read_u32::<BigEndian>()? as usize;
            Ok(Value::Blob(Bytes::from(read_exact_vec(r, len)?)))
        }
        TAG_MAP => {
            check_depth(depth)?;
            let n = r.read_u32::<BigEndian>()? as usize;
            let mut map = ValueMap::with_capacity(n.min(PREALLOC_LIMIT));
            let mut seen = HashSet::with_capacity(n.min(PREALLOC_LIMIT));
            for _ in 0..n {
                let key = read_string(r)?;
                if !seen.insert(key.clone()) {
                    return Err(DecodeError::DuplicateKey(key));
                }
                let val = read_inner(r, depth + 1)?;
                map.push_unchecked(key, val);
            }
            Ok(Value::Map(map))
        }
        TAG_ARRAY => {
            check_depth(depth)?;
            let n = r.read_u32::<BigEndian>()? as usize;
            let mut items = Vec::with_capacity(n.min(PREALLOC_LIMIT));
            for _ in 0..n {
                items.push(read_inner(r, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        other => Err(DecodeError::UnsupportedPayload { tag: other }),
    }
}

fn read_string<R: Read>(r: &mut R) -> Result<String, DecodeError> {
    let len = r.read_u32::<BigEndian>()? as usize;
    let buf = read_exact_vec(r, len)?;
    Ok(String::from_utf8(buf)?)
}

/// Читает ровно `len` байт, не выделяя память под заявленную длину заранее.
fn read_exact_vec<R: Read>(
    r: &mut R,
    len: usize,
) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::with_capacity(len.min(64 * 1024));
    r.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(buf)
}

fn check_depth(depth: usize) -> Result<(), DecodeError> {
    if depth >= MAX_DEPTH {
        return Err(DecodeError::DepthLimit { max: MAX_DEPTH });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::encode;

    /// Тест проверяет, что пустой буфер декодируется как null.
    #[test]
    fn test_empty_is_null() {
        assert_eq!(decode(&[]), Ok(Value::Null));
        assert_eq!(decode(&[TAG_NULL]), Ok(Value::Null));
    }

    /// Тест проверяет ошибку на неизвестном теге.
    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            decode(&[0x7F]),
            Err(DecodeError::UnsupportedPayload { tag: 0x7F })
        );
    }

    /// Тест проверяет обрезанные данные на каждом типе.
    #[test]
    fn test_truncated() {
        assert_eq!(decode(&[TAG_INT, 0, 0]), Err(DecodeError::UnexpectedEof));
        assert_eq!(decode(&[TAG_BOOL]), Err(DecodeError::UnexpectedEof));
        assert_eq!(
            decode(&[TAG_STR, 0, 0, 0, 5, b'a']),
            Err(DecodeError::UnexpectedEof)
        );
        // заявленная длина огромна, данных нет: не должно быть выделения 4 ГБ
        assert_eq!(
            decode(&[TAG_BLOB, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(DecodeError::UnexpectedEof)
        );
        assert_eq!(
            decode(&[TAG_MAP, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(DecodeError::UnexpectedEof)
        );
    }

    #[test]
    fn test_invalid_bool() {
        assert_eq!(decode(&[TAG_BOOL, 2]), Err(DecodeError::InvalidBool(2)));
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            decode(&[TAG_STR, 0, 0, 0, 2, 0xC3, 0x28]),
            Err(DecodeError::InvalidUtf8(_))
        ));
    }

    /// Тест проверяет отказ на повторяющемся ключе.
    #[test]
    fn test_duplicate_key() {
        let buf = [
            &[TAG_MAP, 0, 0, 0, 2][..],
            &[0, 0, 0, 1, b'k', TAG_NULL][..],
            &[0, 0, 0, 1, b'k', TAG_NULL][..],
        ]
        .concat();
        assert_eq!(decode(&buf), Err(DecodeError::DuplicateKey("k".into())));
    }

    #[test]
    fn test_trailing_bytes() {
        assert_eq!(
            decode(&[TAG_NULL, 0, 0]),
            Err(DecodeError::TrailingBytes { count: 2 })
        );
    }

    /// Тест проверяет ограничение глубины на стороне декодера.
    #[test]
    fn test_depth_limit() {
        let mut buf = Vec::new();
        for _ in 0..=MAX_DEPTH {
            buf.extend_from_slice(&[TAG_ARRAY, 0, 0, 0, 1]);
        }
        buf.push(TAG_NULL);
        assert_eq!(
            decode(&buf),
            Err(DecodeError::DepthLimit { max: MAX_DEPTH })
        );
    }

    /// Тест проверяет побитовое сохранение особых чисел с плавающей точкой.
    #[test]
    fn test_float_bits_preserved() {
        for f in [f64::NAN, -0.0, f64::INFINITY, f64::NEG_INFINITY, f64::MIN_POSITIVE] {
            let back = decode(&encode(&Value::Float(f)).unwrap()).unwrap();
            assert_eq!(back.as_f64().map(f64::to_bits), Some(f.to_bits()));
        }
    }
}
