#![no_main]

use libfuzzer_sys::fuzz_target;

use autoresponder::channels::IncomingMessage;

fuzz_target!(|data: &[u8]| {
    // Inbound JSON lines come from an external transport process.
    if let Ok(message) = serde_json::from_slice::<IncomingMessage>(data) {
        let _ = serde_json::to_string(&message);
    }
});
