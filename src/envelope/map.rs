use std::slice;

use super::Value;

/// Словарь строка -> [`Value`], сохраняющий порядок вставки.
///
/// Ключи уникальны: повторная вставка заменяет значение на месте, не меняя
/// позицию ключа. Сравнение двух словарей не зависит от порядка пар.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(String, Value)>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Вставляет пару. Возвращает прежнее значение, если ключ уже был.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.position(key).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut(
        &mut self,
        key: &str,
    ) -> Option<&mut Value> {
        self.position(key).map(move |idx| &mut self.entries[idx].1)
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.position(key).is_some()
    }

    /// Удаляет ключ, сохраняя порядок остальных.
    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Value> {
        self.position(key).map(|idx| self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.entries.iter(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Добавляет пару без проверки уникальности. Декодер проверяет дубликаты
    /// сам, поэтому не платит за линейный поиск.
    pub(crate) fn push_unchecked(
        &mut self,
        key: String,
        value: Value,
    ) {
        self.entries.push((key, value));
    }

    fn position(
        &self,
        key: &str,
    ) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl PartialEq for ValueMap {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

impl Eq for ValueMap {}

/// Итератор по парам словаря в порядке вставки.
pub struct Iter<'a> {
    inner: slice::Iter<'a, (String, Value)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k.as_str(), v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a ValueMap {
    type Item = (&'a str, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for ValueMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K, V> FromIterator<(K, V)> for ValueMap
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что повторная вставка заменяет значение на месте.
    #[test]
    fn test_insert_replaces_in_place() {
        let mut map = ValueMap::new();
        assert!(map.insert("a", 1).is_none());
        map.insert("b", 2);
        assert_eq!(map.insert("a", 10), Some(Value::Int(1)));

        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&Value::Int(10)));
        assert_eq!(map.len(), 2);
    }

    /// Тест проверяет, что равенство словарей не зависит от порядка.
    #[test]
    fn test_eq_ignores_order() {
        let a: ValueMap = [("name", Value::from("zhaoyong")), ("age", Value::from(28))]
            .into_iter()
            .collect();
        let b: ValueMap = [("age", Value::from(28)), ("name", Value::from("zhaoyong"))]
            .into_iter()
            .collect();
        assert_eq!(a, b);

        let c: ValueMap = [("age", Value::from(29))].into_iter().collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut map: ValueMap = [("x", 1), ("y", 2), ("z", 3)].into_iter().collect();
        assert_eq!(map.remove("y"), Some(Value::Int(2)));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["x", "z"]);
        assert!(map.remove("y").is_none());
        assert!(!map.contains_key("y"));
    }
}
