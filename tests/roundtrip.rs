//! End-to-end check of the `heatshrink` CLI binary: compress a temp file,
//! decompress it back, and diff against the original. Exercises the actual
//! `sink`/`poll`/`finish` driver loop in `src/bin/heatshrink.rs`, not just
//! the library API.

use std::fs;
use std::process::Command;

fn bin_path() -> std::path::PathBuf {
    // `CARGO_BIN_EXE_<name>` is set by cargo for integration tests.
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_heatshrink"))
}

fn roundtrip_through_cli(data: &[u8], window: u8, lookahead: u8) {
    let dir = std::env::temp_dir().join(format!(
        "heatshrink-roundtrip-{}-{}-{}",
        std::process::id(),
        window,
        lookahead
    ));
    fs::create_dir_all(&dir).unwrap();

    let input_path = dir.join("input.bin");
    let compressed_path = dir.join("compressed.hs");
    let output_path = dir.join("output.bin");

    fs::write(&input_path, data).unwrap();

    let encode_status = Command::new(bin_path())
        .args([
            "-e",
            "-w",
            &window.to_string(),
            "-l",
            &lookahead.to_string(),
        ])
        .arg(&input_path)
        .arg(&compressed_path)
        .status()
        .unwrap();
    assert!(encode_status.success());

    let decode_status = Command::new(bin_path())
        .args([
            "-d",
            "-w",
            &window.to_string(),
            "-l",
            &lookahead.to_string(),
        ])
        .arg(&compressed_path)
        .arg(&output_path)
        .status()
        .unwrap();
    assert!(decode_status.success());

    let roundtripped = fs::read(&output_path).unwrap();
    assert_eq!(data, roundtripped.as_slice());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cli_roundtrips_text() {
    roundtrip_through_cli(b"the quick brown fox jumps over the lazy dog, over and over again", 8, 4);
}

#[test]
fn cli_roundtrips_empty_file() {
    roundtrip_through_cli(b"", 8, 4);
}

#[test]
fn cli_roundtrips_repetitive_data() {
    let data = vec![0x42u8; 10_000];
    roundtrip_through_cli(&data, 8, 4);
}

#[test]
fn cli_roundtrips_with_custom_window_and_lookahead() {
    let data: Vec<u8> = (0u32..2000).map(|x| (x % 251) as u8).collect();
    roundtrip_through_cli(&data, 11, 6);
}

#[test]
fn cli_rejects_invalid_parameters() {
    let dir = std::env::temp_dir().join(format!("heatshrink-invalid-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let input_path = dir.join("input.bin");
    let output_path = dir.join("output.hs");
    fs::write(&input_path, b"data").unwrap();

    let status = Command::new(bin_path())
        .args(["-e", "-w", "20", "-l", "4"])
        .arg(&input_path)
        .arg(&output_path)
        .status()
        .unwrap();
    assert!(!status.success());

    let _ = fs::remove_dir_all(&dir);
}
