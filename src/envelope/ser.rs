//! Мост между serde и моделью [`Value`].
//!
//! `Value::from_serialize` превращает любой `T: Serialize` в значение
//! конверта; `impl Serialize for Value` делает обратное для вывода в JSON и
//! другие форматы.

use std::fmt;

use bytes::Bytes;
use nsqbridge_error::EncodeError;
use serde::{
    ser::{
        self, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant,
        SerializeTuple, SerializeTupleStruct, SerializeTupleVariant,
    },
    Serialize, Serializer,
};
use thiserror::Error;

use super::{Value, ValueMap};

impl Value {
    /// Строит значение из любого сериализуемого типа.
    ///
    /// Беззнаковые числа выше `i64::MAX`, 128-битные числа и нестроковые
    /// ключи словарей дают [`EncodeError::UnsupportedPayload`].
    pub fn from_serialize<T: Serialize + ?Sized>(v: &T) -> Result<Value, EncodeError> {
        v.serialize(ValueSerializer).map_err(|e| e.0)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(
        &self,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => s.serialize_unit(),
            Value::Bool(b) => s.serialize_bool(*b),
            Value::Int(i) => s.serialize_i64(*i),
            Value::Float(f) => s.serialize_f64(*f),
            Value::Str(v) => s.serialize_str(v),
            Value::Blob(b) => s.serialize_bytes(b),
            Value::Map(m) => {
                let mut map = s.serialize_map(Some(m.len()))?;
                for (k, v) in m.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Array(items) => {
                let mut seq = s.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// Обёртка над [`EncodeError`], реализующая `serde::ser::Error`.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct SerializeError(pub EncodeError);

impl ser::Error for SerializeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        SerializeError(EncodeError::UnsupportedPayload {
            kind: msg.to_string(),
        })
    }
}

fn unsupported(kind: impl Into<String>) -> SerializeError {
    SerializeError(EncodeError::UnsupportedPayload { kind: kind.into() })
}

struct ValueSerializer;

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = SerializeError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(
        self,
        v: bool,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(
        self,
        v: i8,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i16(
        self,
        v: i16,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i32(
        self,
        v: i32,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i64(
        self,
        v: i64,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(
        self,
        v: u8,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u16(
        self,
        v: u16,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u32(
        self,
        v: u32,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u64(
        self,
        v: u64,
    ) -> Result<Value, SerializeError> {
        Value::try_from(v).map_err(SerializeError)
    }

    fn serialize_f32(
        self,
        v: f32,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Float(v.into()))
    }

    fn serialize_f64(
        self,
        v: f64,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Float(v))
    }

    fn serialize_char(
        self,
        v: char,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_str(
        self,
        v: &str,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Str(v.to_owned()))
    }

    fn serialize_bytes(
        self,
        v: &[u8],
    ) -> Result<Value, SerializeError> {
        Ok(Value::Blob(Bytes::copy_from_slice(v)))
    }

    fn serialize_none(self) -> Result<Value, SerializeError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> Result<Value, SerializeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, SerializeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(
        self,
        _name: &'static str,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, SerializeError> {
        Ok(Value::Str(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, SerializeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, SerializeError> {
        let mut map = ValueMap::with_capacity(1);
        map.insert(variant, value.serialize(ValueSerializer)?);
        Ok(Value::Map(map))
    }

    fn serialize_seq(
        self,
        len: Option<usize>,
    ) -> Result<SeqBuilder, SerializeError> {
        Ok(SeqBuilder::new(len))
    }

    fn serialize_tuple(
        self,
        len: usize,
    ) -> Result<SeqBuilder, SerializeError> {
        Ok(SeqBuilder::new(Some(len)))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, SerializeError> {
        Ok(SeqBuilder::new(Some(len)))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, SerializeError> {
        Ok(VariantSeqBuilder {
            variant,
            seq: SeqBuilder::new(Some(len)),
        })
    }

    fn serialize_map(
        self,
        len: Option<usize>,
    ) -> Result<MapBuilder, SerializeError> {
        Ok(MapBuilder::new(len))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<MapBuilder, SerializeError> {
        Ok(MapBuilder::new(Some(len)))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantMapBuilder, SerializeError> {
        Ok(VariantMapBuilder {
            variant,
            map: MapBuilder::new(Some(len)),
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
}

impl SeqBuilder {
    fn new(len: Option<usize>) -> Self {
        Self {
            items: Vec::with_capacity(len.unwrap_or(0)),
        }
    }

    fn push<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), SerializeError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }
}

impl SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), SerializeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        Ok(Value::Array(self.items))
    }
}

impl SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), SerializeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        Ok(Value::Array(self.items))
    }
}

impl SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), SerializeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        Ok(Value::Array(self.items))
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    seq: SeqBuilder,
}

impl SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), SerializeError> {
        self.seq.push(value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        let mut map = ValueMap::with_capacity(1);
        map.insert(self.variant, Value::Array(self.seq.items));
        Ok(Value::Map(map))
    }
}

struct MapBuilder {
    map: ValueMap,
    pending_key: Option<String>,
}

impl MapBuilder {
    fn new(len: Option<usize>) -> Self {
        Self {
            map: ValueMap::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        }
    }
}

impl SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_key<T: Serialize + ?Sized>(
        &mut self,
        key: &T,
    ) -> Result<(), SerializeError> {
        match key.serialize(ValueSerializer)? {
            Value::Str(k) => {
                self.pending_key = Some(k);
                Ok(())
            }
            other => Err(unsupported(format!("map key of kind {}", other.kind()))),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), SerializeError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| unsupported("map value without key"))?;
        self.map.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, SerializeError> {
        Ok(Value::Map(self.map))
    }
}

impl SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SerializeError> {
        self.map.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, SerializeError> {
        Ok(Value::Map(self.map))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    map: MapBuilder,
}

impl SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = SerializeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SerializeError> {
        SerializeStruct::serialize_field(&mut self.map, key, value)
    }

    fn end(self) -> Result<Value, SerializeError> {
        let mut outer = ValueMap::with_capacity(1);
        outer.insert(self.variant, Value::Map(self.map.map));
        Ok(Value::Map(outer))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Person {
        name: String,
        age: u32,
    }

    #[derive(Serialize)]
    enum Shape {
        Point,
        Circle(f64),
        Rect { w: i32, h: i32 },
    }

    /// Тест проверяет, что структура становится словарём в порядке полей.
    #[test]
    fn test_struct_to_map() {
        let v = Value::from_serialize(&Person {
            name: "zhaoyong".into(),
            age: 28,
        })
        .unwrap();
        let map = v.as_map().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["name", "age"]);
        assert_eq!(map.get("age"), Some(&Value::Int(28)));
    }

    /// Тест проверяет представление вариантов перечислений.
    #[test]
    fn test_enum_variants() {
        assert_eq!(
            Value::from_serialize(&Shape::Point).unwrap(),
            Value::from("Point")
        );

        let circle = Value::from_serialize(&Shape::Circle(1.5)).unwrap();
        assert_eq!(circle.as_map().and_then(|m| m.get("Circle")), Some(&Value::Float(1.5)));

        let rect = Value::from_serialize(&Shape::Rect { w: 2, h: 3 }).unwrap();
        let inner = rect.as_map().and_then(|m| m.get("Rect")).and_then(Value::as_map);
        assert_eq!(inner.and_then(|m| m.get("h")), Some(&Value::Int(3)));
    }

    /// Тест проверяет отказ на значениях вне закрытого набора.
    #[test]
    fn test_unsupported_values() {
        assert!(matches!(
            Value::from_serialize(&u64::MAX),
            Err(EncodeError::UnsupportedPayload { .. })
        ));

        let mut by_int = BTreeMap::new();
        by_int.insert(1, "one");
        assert!(matches!(
            Value::from_serialize(&by_int),
            Err(EncodeError::UnsupportedPayload { .. })
        ));

        assert!(Value::from_serialize(&1u128).is_err());
    }

    /// Тест проверяет сериализацию Value в JSON.
    #[test]
    fn test_value_to_json() {
        let v = Value::Array(vec![Value::Null, true.into(), 1.into(), "hello".into()]);
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"[null,true,1,"hello"]"#
        );
    }

    #[test]
    fn test_json_roundtrip_through_value() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"name":"zhaoyong","age":28,"tags":[1,2.5]}"#).unwrap();
        let v = Value::from_serialize(&json).unwrap();
        let map = v.as_map().unwrap();
        assert_eq!(map.get("name"), Some(&Value::from("zhaoyong")));
        assert_eq!(
            map.get("tags"),
            Some(&Value::Array(vec![Value::Int(1), Value::Float(2.5)]))
        );
    }
}
