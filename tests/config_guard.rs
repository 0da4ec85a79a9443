// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use regex::Regex;
use std::fs;
use std::path::Path;

const CANDIDATES: [&str; 3] = ["config.toml", "config.example.toml", ".env.example"];

/// Fail CI if config files contain 64-hex private keys.
#[test]
fn no_committed_hex_keys_in_configs() {
    let re = Regex::new(r"(0x)?[a-fA-F0-9]{64}").unwrap();
    for file in CANDIDATES {
        if !Path::new(file).exists() {
            continue;
        }
        let body = fs::read_to_string(file).expect("read config");
        for (idx, line) in body.lines().enumerate() {
            if re.is_match(line) {
                panic!("Secret-looking hex in {} at line {}", file, idx + 1);
            }
        }
    }
}

/// The example config must not assign the wallet key at all; it belongs in the environment.
#[test]
fn example_config_leaves_wallet_key_to_environment() {
    let re = Regex::new(r"(?m)^\s*wallet_key\s*=").unwrap();
    let body = fs::read_to_string("config.example.toml").expect("read example config");
    assert!(!re.is_match(&body), "wallet_key assigned in config.example.toml");
}
