#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use nsqbridge::transport::nsq::protocol::{decode_frame, encode_frame};

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);
    // разбор идёт, пока хватает данных; ошибка останавливает поток кадров
    while let Ok(Some(frame)) = decode_frame(&mut buf, 64 * 1024) {
        let mut again = BytesMut::new();
        encode_frame(&frame, &mut again);
        let reparsed = decode_frame(&mut again, 64 * 1024)
            .expect("encoded frame must decode")
            .expect("encoded frame is complete");
        assert_eq!(reparsed, frame);
        assert!(again.is_empty());
    }
});
