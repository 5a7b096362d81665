#![no_main]
//! Fuzz target for config TOML parsing
//!
//! Feeds random bytes as TOML to the config parser to find panics,
//! hangs, or unexpected behavior in deserialization and validation.

use libfuzzer_sys::fuzz_target;

use compositor::config::Config;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    // Parsing and validation must never panic
    if let Ok(config) = Config::from_toml_str(s) {
        let _ = config.transaction_timeout();
        let _ = config.direct_scanout_enabled();
        // Accepted configs serialize back to TOML
        let _ = toml::to_string(&config);
    }
});
