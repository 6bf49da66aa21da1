//! Golden vectors for the archive layout
//!
//! The archive is the plaintext sealed inside every container, so its byte
//! layout must not drift between releases.

use std::fs;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use saltyvault::archive;
use serde::Deserialize;
use tempfile::TempDir;

#[derive(Debug, Deserialize)]
struct GoldenFile {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GoldenVector {
    comment: String,
    files: Vec<GoldenFile>,
    archive: String,
}

fn load_golden_vectors() -> Vec<GoldenVector> {
    let json_data = include_str!("../testdata/archive-vectors.json");
    serde_json::from_str(json_data).expect("failed to parse golden vectors")
}

fn decode(b64: &str) -> Vec<u8> {
    BASE64_STANDARD.decode(b64).expect("invalid base64 in golden vectors")
}

#[test]
fn test_pack_matches_golden_vectors() {
    for vector in load_golden_vectors() {
        let src = TempDir::new().unwrap();
        for file in &vector.files {
            let path = src.path().join(&file.path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, decode(&file.content)).unwrap();
        }

        let packed = archive::pack(src.path()).unwrap();
        assert_eq!(
            packed,
            decode(&vector.archive),
            "pack mismatch: {}",
            vector.comment
        );
    }
}

#[test]
fn test_unpack_matches_golden_vectors() {
    for vector in load_golden_vectors() {
        let dest = TempDir::new().unwrap();
        archive::unpack(&decode(&vector.archive), dest.path()).unwrap();

        let mut expected: Vec<&str> = vector.files.iter().map(|f| f.path.as_str()).collect();
        expected.sort_unstable();
        let listed: Vec<String> = archive::list(dest.path())
            .unwrap()
            .into_iter()
            .map(|entry| entry.rel_path)
            .collect();
        assert_eq!(listed, expected, "unpack listing: {}", vector.comment);

        for file in &vector.files {
            let content = fs::read(dest.path().join(&file.path)).unwrap();
            assert_eq!(
                content,
                decode(&file.content),
                "unpack content of {}: {}",
                file.path,
                vector.comment
            );
        }
    }
}
