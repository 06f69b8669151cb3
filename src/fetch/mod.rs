//! Loads import sources from disk or over HTTP(S).

mod http;

pub use http::{BasicClient, HttpClient};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Reads `source` as a URL when it starts with `http://` or `https://`,
/// otherwise as a local path. Gzip payloads are decompressed.
#[tracing::instrument]
pub async fn load_source(source: &str) -> Result<Vec<u8>> {
    let bytes = if is_url(source) {
        let client = BasicClient::new()?;
        fetch_bytes(&client, source)
            .await
            .with_context(|| format!("fetching {source}"))?
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("reading {source}"))?
    };

    debug!(bytes = bytes.len(), "Source loaded");
    maybe_gunzip(bytes)
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Decompresses `bytes` if they carry the gzip magic number, otherwise
/// returns them untouched.
pub fn maybe_gunzip(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes);
    }

    let mut out = Vec::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut out)
        .context("decompressing gzip source")?;
    debug!(compressed = bytes.len(), decompressed = out.len(), "Gunzipped source");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.org/gradedata.js"));
        assert!(is_url("http://localhost/grades.csv"));
        assert!(!is_url("httpdata/grades.csv"));
        assert!(!is_url("/tmp/grades.csv"));
    }

    #[test]
    fn test_plain_bytes_pass_through() {
        assert_eq!(maybe_gunzip(b"TERM,SUBJ".to_vec()).unwrap(), b"TERM,SUBJ");
    }

    #[test]
    fn test_gzip_bytes_are_decompressed() {
        let packed = gzip(b"var groups = {};");
        assert_eq!(maybe_gunzip(packed).unwrap(), b"var groups = {};");
    }

    #[test]
    fn test_truncated_gzip_is_an_error() {
        let mut packed = gzip(b"some longer payload to compress");
        packed.truncate(12);
        assert!(maybe_gunzip(packed).is_err());
    }

    #[tokio::test]
    async fn test_load_source_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&gzip(b"[]")).unwrap();

        let bytes = load_source(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, b"[]");
    }

    #[tokio::test]
    async fn test_load_source_missing_file() {
        let err = load_source("/nonexistent/grades.csv").await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/grades.csv"));
    }
}
