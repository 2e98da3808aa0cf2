//! Однобайтовые теги типов конверта.
//!
//! Тег всегда предшествует байтам значения. Используется в модулях
//! `encode` и `decode`.

/// Строка UTF-8
pub const TAG_STR: u8 = 0x01;
/// Целое число (i64)
pub const TAG_INT: u8 = 0x02;
/// Число с плавающей точкой (f64)
pub const TAG_FLOAT: u8 = 0x03;
/// Null
pub const TAG_NULL: u8 = 0x04;
/// Упорядоченный словарь строка -> значение
pub const TAG_MAP: u8 = 0x06;
/// Логическое значение (bool)
pub const TAG_BOOL: u8 = 0x0B;
/// Массив произвольных значений
pub const TAG_ARRAY: u8 = 0x0D;
/// Бинарные данные
pub const TAG_BLOB: u8 = 0x0E;

/// Максимальная вложенность словарей и массивов.
pub const MAX_DEPTH: usize = 64;
