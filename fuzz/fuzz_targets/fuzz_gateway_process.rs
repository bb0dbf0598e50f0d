#![no_main]

use libfuzzer_sys::fuzz_target;
use rfgate::{Gateway, Metrics, SecretKey};

fuzz_target!(|data: &[u8]| {
    let Ok(metrics) = Metrics::new() else {
        return;
    };
    let mut gateway = Gateway::new(SecretKey::new([0x5Au8; 32]), 8, metrics);
    for frame in data.chunks(rfgate::PACKET_LEN) {
        let verdict = gateway.process_frame(frame);
        if frame.len() != rfgate::PACKET_LEN {
            assert!(!verdict.is_forwarded());
        }
        assert!(gateway.replay().len() <= gateway.replay().capacity());
    }
});
