#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use nsqbridge::{decode, encode, Value, ValueMap};

/// Значение для генерации: глубина ограничена, чтобы не упираться в MAX_DEPTH.
#[derive(Debug)]
struct FuzzValue(Value);

impl<'a> Arbitrary<'a> for FuzzValue {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        arbitrary_value(u, 0).map(FuzzValue)
    }
}

fn arbitrary_value(
    u: &mut Unstructured<'_>,
    depth: usize,
) -> arbitrary::Result<Value> {
    let max_kind = if depth >= 8 { 5 } else { 7 };
    Ok(match u.int_in_range(0..=max_kind)? {
        0 => Value::Null,
        1 => Value::Bool(u.arbitrary()?),
        2 => Value::Int(u.arbitrary()?),
        3 => Value::Float(u.arbitrary()?),
        4 => Value::Str(u.arbitrary()?),
        5 => Value::Blob(Bytes::from(u.arbitrary::<Vec<u8>>()?)),
        6 => {
            let len = u.int_in_range(0..=8)?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(arbitrary_value(u, depth + 1)?);
            }
            Value::Array(items)
        }
        _ => {
            let len = u.int_in_range(0..=8)?;
            let mut map = ValueMap::with_capacity(len);
            for _ in 0..len {
                let key: String = u.arbitrary()?;
                map.insert(key, arbitrary_value(u, depth + 1)?);
            }
            Value::Map(map)
        }
    })
}

fuzz_target!(|input: FuzzValue| {
    let bytes = encode(&input.0).expect("bounded value must encode");
    let decoded = decode(&bytes).expect("encoded value must decode");
    assert_eq!(decoded, input.0);
});
