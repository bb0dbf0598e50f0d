#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = rfgate::TelemetryPacket::decode(data) {
        assert_eq!(&packet.encode()[..], data);
        let _ = rfgate::ForwardRecord::from_packet(&packet).encode();
    }
});
