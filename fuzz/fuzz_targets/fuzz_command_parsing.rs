#![no_main]

use libfuzzer_sys::fuzz_target;

use autoresponder::commands::{parse, Command};

fuzz_target!(|data: &str| {
    // Owner input is free text; the parser must never panic, and anything it
    // accepts must carry usable arguments.
    if let Ok(command) = parse(data) {
        match command {
            Command::SetMessage(text) | Command::UseTemplate(text) | Command::DeleteTemplate(text) => {
                assert!(!text.trim().is_empty());
            }
            Command::SetTemplate { name, body } => {
                assert!(!name.is_empty());
                assert!(!body.is_empty());
            }
            _ => {}
        }
    }
});
