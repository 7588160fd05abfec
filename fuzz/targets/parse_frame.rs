#![no_main]

use libfuzzer_sys::fuzz_target;
use zumq::network::wire::Frame;

fuzz_target!(|data: &[u8]| {
    // Разбор не должен паниковать ни на каких байтах.
    let Ok(frame) = Frame::parse(data) else {
        return;
    };

    // Кадр, который удалось разобрать, кодируется в строку, разбираемую
    // в тот же кадр.
    let encoded = frame.to_bytes();
    assert!(encoded.ends_with(b"\r\n"), "encoded frame lacks line ending");
    match Frame::parse(&encoded) {
        Ok(again) => assert_eq!(again, frame, "re-parse changed frame"),
        Err(e) => panic!("encoded frame {encoded:?} failed to parse: {e}"),
    }
});
