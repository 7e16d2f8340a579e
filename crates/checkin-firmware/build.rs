//! Forwards the station configuration from `.env` to the compiler.
//!
//! Every `CHECKIN_*` entry becomes a `rustc-env` variable read with
//! `option_env!` in `src/config.rs`. Variables exported in the shell take
//! precedence over the file.

const VARIABLES: &[&str] = &[
    "CHECKIN_WIFI_SSID",
    "CHECKIN_WIFI_PASSWORD",
    "CHECKIN_SERVER_URL",
    "CHECKIN_DEVICE_ID",
    "CHECKIN_DEVICE_NAME",
    "CHECKIN_SCAN_COOLDOWN_MS",
    "CHECKIN_WIFI_TIMEOUT_MS",
    "CHECKIN_HTTP_TIMEOUT_MS",
    "CHECKIN_DEBUG",
    "CHECKIN_HEARTBEAT",
];

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");
    println!("cargo:rerun-if-changed=.env");
    for name in VARIABLES {
        println!("cargo:rerun-if-env-changed={name}");
    }

    let Ok(entries) = dotenvy::dotenv_iter() else {
        println!("cargo:warning=no .env found, using built-in station defaults");
        return;
    };

    for entry in entries {
        let (key, value) = match entry {
            Ok(pair) => pair,
            Err(e) => {
                println!("cargo:warning=skipping malformed .env line: {e}");
                continue;
            }
        };
        if !key.starts_with("CHECKIN_") || std::env::var_os(&key).is_some() {
            continue;
        }
        if !VARIABLES.contains(&key.as_str()) {
            println!("cargo:warning=unknown setting {key} in .env");
            continue;
        }
        println!("cargo:rustc-env={key}={value}");
    }
}
