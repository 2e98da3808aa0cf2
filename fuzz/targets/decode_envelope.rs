#![no_main]

use libfuzzer_sys::fuzz_target;
use nsqbridge::{decode, encode};

fuzz_target!(|data: &[u8]| {
    // decoder не должен паниковать ни на каких данных
    if let Ok(value) = decode(data) {
        // всё, что декодировалось, кодируется обратно в те же байты
        // (пустой буфер декодируется как null, но кодируется тегом)
        let bytes = encode(&value).expect("decoded value must encode");
        if !data.is_empty() {
            assert_eq!(&bytes[..], data, "re-encoding changed bytes of {value:?}");
        }
    }
});
