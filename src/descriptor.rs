//! Request descriptors
//!
//! A descriptor is a file dropped by Sonarr/Radarr into the per-category
//! descriptor folder: either a `.magnet` file holding a magnet link, or a
//! `.torrent` metainfo file from which a magnet link is derived.

use crate::utils::delete_file_with_retry;
use crate::{Error, Result};
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use std::path::Path;
use std::time::Duration;

/// Kind of descriptor, determined by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Text file containing a magnet link
    Magnet,
    /// Bencoded torrent metainfo
    Torrent,
}

impl DescriptorKind {
    /// Classify a path; `None` if it is not a descriptor
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("magnet") {
            Some(DescriptorKind::Magnet)
        } else if ext.eq_ignore_ascii_case("torrent") {
            Some(DescriptorKind::Torrent)
        } else {
            None
        }
    }
}

/// Whether `path` names a descriptor file
pub fn is_descriptor(path: &Path) -> bool {
    DescriptorKind::of(path).is_some()
}

/// Release title the upstream catalog knows this request by
///
/// This is the descriptor's file name without its extension.
pub fn release_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read the acquisition link out of a descriptor
pub async fn read_link(path: &Path) -> Result<String> {
    let kind = DescriptorKind::of(path).ok_or_else(|| Error::InvalidDescriptor {
        path: path.to_path_buf(),
        reason: "unsupported extension".to_string(),
    })?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::InvalidDescriptor {
            path: path.to_path_buf(),
            reason: format!("unreadable: {}", e),
        })?;

    let link = match kind {
        DescriptorKind::Magnet => parse_magnet(&bytes),
        DescriptorKind::Torrent => magnet_from_torrent(&bytes),
    };

    link.map_err(|reason| Error::InvalidDescriptor {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_magnet(bytes: &[u8]) -> std::result::Result<String, String> {
    let text = std::str::from_utf8(bytes).map_err(|_| "magnet file is not UTF-8".to_string())?;
    let link = text.trim();
    if link.is_empty() {
        return Err("magnet file is empty".to_string());
    }
    if !link.starts_with("magnet:?") {
        return Err("content is not a magnet link".to_string());
    }
    Ok(link.to_string())
}

/// Derive a magnet link from torrent metainfo
///
/// The info hash is the SHA-1 of the bencoded `info` dictionary.
pub fn magnet_from_torrent(bytes: &[u8]) -> std::result::Result<String, String> {
    let root: Value =
        serde_bencode::from_bytes(bytes).map_err(|e| format!("invalid bencode: {}", e))?;

    let Value::Dict(root) = root else {
        return Err("torrent root is not a dictionary".to_string());
    };
    let info = root
        .get(b"info".as_slice())
        .ok_or_else(|| "torrent has no info dictionary".to_string())?;
    let Value::Dict(info_dict) = info else {
        return Err("torrent info is not a dictionary".to_string());
    };

    let encoded =
        serde_bencode::to_bytes(info).map_err(|e| format!("failed to re-encode info: {}", e))?;
    let hash = hex::encode(Sha1::digest(&encoded));

    let mut link = format!("magnet:?xt=urn:btih:{}", hash);
    if let Some(Value::Bytes(name)) = info_dict.get(b"name".as_slice()) {
        let name = String::from_utf8_lossy(name);
        link.push_str("&dn=");
        link.push_str(&urlencoding::encode(&name));
    }
    Ok(link)
}

/// Remove a consumed descriptor, retrying while the delete is blocked
pub async fn delete_descriptor(path: &Path, attempts: u32, delay: Duration) -> Result<()> {
    delete_file_with_retry(path, attempts, delay).await?;
    tracing::info!(path = %path.display(), "descriptor deleted");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const INFO: &[u8] = b"d6:lengthi1024e4:name14:Movie 2024.mkv12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaae";

    fn torrent_bytes() -> Vec<u8> {
        let mut out = b"d8:announce20:http://tracker/annou4:info".to_vec();
        out.extend_from_slice(INFO);
        out.push(b'e');
        out
    }

    #[test]
    fn descriptor_kind_by_extension() {
        assert_eq!(
            DescriptorKind::of(Path::new("/t/radarr/Movie.magnet")),
            Some(DescriptorKind::Magnet)
        );
        assert_eq!(
            DescriptorKind::of(Path::new("/t/sonarr/Show.S01.TORRENT")),
            Some(DescriptorKind::Torrent)
        );
        assert!(!is_descriptor(Path::new("/t/radarr/readme.txt")));
        assert!(!is_descriptor(Path::new("/t/radarr/noext")));
    }

    #[test]
    fn release_title_is_file_stem() {
        assert_eq!(
            release_title(Path::new("/t/radarr/Movie.2024.1080p.magnet")),
            "Movie.2024.1080p"
        );
    }

    #[test]
    fn torrent_info_hash_matches_sha1_of_info() {
        let expected = hex::encode(Sha1::digest(INFO));
        let link = magnet_from_torrent(&torrent_bytes()).unwrap();
        assert_eq!(
            link,
            format!("magnet:?xt=urn:btih:{}&dn=Movie%202024.mkv", expected)
        );
    }

    #[test]
    fn torrent_without_info_is_rejected() {
        assert!(magnet_from_torrent(b"d8:announce3:abce").is_err());
        assert!(magnet_from_torrent(b"not bencode").is_err());
        assert!(magnet_from_torrent(b"li1ee").is_err());
    }

    #[tokio::test]
    async fn read_magnet_trims_whitespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Movie.magnet");
        std::fs::write(&path, "  magnet:?xt=urn:btih:abc&dn=Movie\n").unwrap();

        let link = read_link(&path).await.unwrap();
        assert_eq!(link, "magnet:?xt=urn:btih:abc&dn=Movie");
    }

    #[tokio::test]
    async fn read_invalid_magnet_is_invalid_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Movie.magnet");
        std::fs::write(&path, "http://example.com/file").unwrap();

        let err = read_link(&path).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor { .. }));
    }

    #[tokio::test]
    async fn read_torrent_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Movie.torrent");
        std::fs::write(&path, torrent_bytes()).unwrap();

        let link = read_link(&path).await.unwrap();
        assert!(link.starts_with("magnet:?xt=urn:btih:"));
    }

    #[tokio::test]
    async fn delete_descriptor_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Movie.magnet");
        std::fs::write(&path, "magnet:?xt=urn:btih:abc").unwrap();

        delete_descriptor(&path, 5, Duration::from_millis(5))
            .await
            .unwrap();
        assert!(!path.exists());
    }
}
