use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

fn committed_inputs() -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = ["config.toml", "config.prod.toml", "config.dev.toml"]
        .iter()
        .map(PathBuf::from)
        .collect();
    // Asset graphs and market snapshots ship next to the config.
    if let Ok(entries) = fs::read_dir("data") {
        files.extend(
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json")),
        );
    }
    files
}

/// Fail CI if config or data files contain 64-hex private keys.
#[test]
fn no_committed_hex_keys_in_inputs() {
    let re = Regex::new(r"0x?[a-fA-F0-9]{64}").unwrap();
    for file in committed_inputs() {
        if !Path::new(&file).exists() {
            continue;
        }
        let body = fs::read_to_string(&file).expect("read input");
        for (idx, line) in body.lines().enumerate() {
            if re.is_match(line) {
                panic!("Secret-looking hex in {} at line {}", file.display(), idx + 1);
            }
        }
    }
}
