//! Streamed MD5 digesting for sync-file change detection.
//!
//! The change detector compares whole-file digests; there is no
//! incremental or Merkle structure. Files are read in 4 KiB chunks so a
//! large document never sits in memory at once.

use md5::{Digest, Md5};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::Result;

const READ_CHUNK: usize = 4096;

/// Compute the MD5 digest of a file, returned as lowercase hex.
pub async fn md5_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Md5::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let got = file.read(&mut chunk).await?;
        if got == 0 {
            break;
        }
        hasher.update(&chunk[..got]);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(hex)
}

/// Whether a file's content no longer matches a previously observed digest.
pub async fn has_changed(path: &Path, previous_hex: &str) -> Result<bool> {
    let current = md5_hex(path).await?;
    Ok(current != previous_hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).await.unwrap();
        f.write_all(content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "abc.txt", b"abc").await;
        // RFC 1321 test vector for "abc".
        assert_eq!(
            md5_hex(&path).await.unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[tokio::test]
    async fn test_empty_file_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "empty", b"").await;
        assert_eq!(
            md5_hex(&path).await.unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[tokio::test]
    async fn test_digest_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let content = vec![0x5au8; READ_CHUNK * 3 + 17];
        let path = write_file(&dir, "big.bin", &content).await;
        let streamed = md5_hex(&path).await.unwrap();
        let mut hasher = Md5::new();
        hasher.update(&content);
        let oneshot: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        assert_eq!(streamed, oneshot);
    }

    #[tokio::test]
    async fn test_has_changed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "notes.md", b"v1").await;
        let first = md5_hex(&path).await.unwrap();
        assert!(!has_changed(&path, &first).await.unwrap());
        write_file(&dir, "notes.md", b"v2").await;
        assert!(has_changed(&path, &first).await.unwrap());
    }
}
