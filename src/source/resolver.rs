//! Source resolution for uploaded PDF data

use crate::error::{Error, Result};
use base64::Engine;
use futures_util::StreamExt;
use std::net::IpAddr;
use std::path::Path;

/// Name used when a source carries no file name of its own
pub const DEFAULT_FILE_NAME: &str = "document.pdf";

/// Resolved PDF data
#[derive(Debug)]
pub struct ResolvedPdf {
    pub data: Vec<u8>,
    /// Where the bytes came from, for logging
    pub source_name: String,
    /// Base name of the uploaded document
    pub file_name: String,
}

fn check_size(size: u64, max_bytes: u64) -> Result<()> {
    if size > max_bytes {
        return Err(Error::FileTooLarge {
            size,
            max_size: max_bytes,
        });
    }
    Ok(())
}

/// Reject anything that does not carry the PDF media type signature
pub fn ensure_pdf_header(data: &[u8], what: &str) -> Result<()> {
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: format!("{} is not a valid PDF file", what),
        });
    }
    Ok(())
}

/// Resolve a file path to PDF data
pub fn resolve_path<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<ResolvedPdf> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    check_size(std::fs::metadata(path)?.len(), max_bytes)?;
    let data = std::fs::read(path).map_err(Error::Io)?;
    ensure_pdf_header(&data, "File")?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

    Ok(ResolvedPdf {
        data,
        source_name: path.display().to_string(),
        file_name,
    })
}

/// Resolve base64 encoded data to PDF data
pub fn resolve_base64(base64_data: &str, max_bytes: u64) -> Result<ResolvedPdf> {
    // Decoded size is at most 3/4 of the encoded length
    check_size(base64_data.len() as u64 / 4 * 3, max_bytes)?;

    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(base64_data)?;

    check_size(data.len() as u64, max_bytes)?;
    ensure_pdf_header(&data, "Decoded data")?;

    Ok(ResolvedPdf {
        data,
        source_name: "<base64>".to_string(),
        file_name: DEFAULT_FILE_NAME.to_string(),
    })
}

/// Check if an IP address is private/reserved (loopback, link-local, private ranges, etc.)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64 // CGNAT 100.64/10
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || {
                let segments = v6.segments();
                // fc00::/7 unique local, fe80::/10 link-local
                (segments[0] & 0xFE00) == 0xFC00 || (segments[0] & 0xFFC0) == 0xFE80
            }
        }
    }
}

/// Check URL for SSRF by resolving DNS and verifying IPs are public
async fn check_ssrf(url_str: &str) -> Result<()> {
    let parsed = url::Url::parse(url_str).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {}", e),
    })?;

    let host = parsed.host_str().ok_or_else(|| Error::SourceResolution {
        reason: "URL has no host".to_string(),
    })?;

    let port = parsed.port_or_known_default().unwrap_or(443);
    let addr_str = format!("{}:{}", host, port);

    let addrs = tokio::net::lookup_host(&addr_str)
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::SsrfBlocked {
                url: url_str.to_string(),
            });
        }
    }

    Ok(())
}

/// Last non-empty path segment of a URL, if any
fn url_file_name(url_str: &str) -> Option<String> {
    let parsed = url::Url::parse(url_str).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Resolve a URL to PDF data with SSRF protection and download size limits
pub async fn resolve_url(url: &str, allow_private_urls: bool, max_bytes: u64) -> Result<ResolvedPdf> {
    if !allow_private_urls {
        check_ssrf(url).await?;
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .map_err(Error::HttpRequest)?;

    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(Error::SourceResolution {
            reason: format!("HTTP request failed with status: {}", response.status()),
        });
    }

    if let Some(content_length) = response.content_length() {
        check_size(content_length, max_bytes)?;
    }

    // Stream with incremental size checking
    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Error::HttpRequest)?;
        data.extend_from_slice(&chunk);
        check_size(data.len() as u64, max_bytes)?;
    }

    ensure_pdf_header(&data, "Downloaded data")?;

    Ok(ResolvedPdf {
        data,
        source_name: url.to_string(),
        file_name: url_file_name(url).unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MAX: u64 = 50 * 1024 * 1024;

    #[test]
    fn test_resolve_base64_not_pdf() {
        let result = resolve_base64("SGVsbG8gV29ybGQ=", MAX); // "Hello World"
        assert!(matches!(result, Err(Error::InvalidPdf { .. })));
    }

    #[test]
    fn test_resolve_base64_invalid_base64() {
        let result = resolve_base64("not valid base64!!!", MAX);
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_base64_too_large() {
        // "%PDF-1.7 padding" encoded, against a tiny limit
        let result = resolve_base64("JVBERi0xLjcgcGFkZGluZw==", 8);
        assert!(matches!(result, Err(Error::FileTooLarge { max_size: 8, .. })));
    }

    #[test]
    fn test_resolve_base64_ok() {
        let resolved = resolve_base64("JVBERi0xLjcgcGFkZGluZw==", MAX).unwrap();
        assert!(resolved.data.starts_with(b"%PDF"));
        assert_eq!(resolved.file_name, DEFAULT_FILE_NAME);
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/path/file.pdf", MAX);
        assert!(matches!(result, Err(Error::PdfNotFound { .. })));
    }

    #[test]
    fn test_resolve_path_checks_size_and_header() {
        let dir = tempfile::tempdir().unwrap();

        let text = dir.path().join("notes.pdf");
        std::fs::File::create(&text)
            .unwrap()
            .write_all(b"plain text")
            .unwrap();
        assert!(matches!(resolve_path(&text, MAX), Err(Error::InvalidPdf { .. })));

        let pdf = dir.path().join("application.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n%%EOF\n").unwrap();
        assert!(matches!(resolve_path(&pdf, 4), Err(Error::FileTooLarge { .. })));

        let resolved = resolve_path(&pdf, MAX).unwrap();
        assert_eq!(resolved.file_name, "application.pdf");
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(
            url_file_name("https://example.com/forms/w9.pdf?x=1"),
            Some("w9.pdf".to_string())
        );
        assert_eq!(url_file_name("https://example.com/"), None);
    }

    #[test]
    fn test_is_private_ip_v4() {
        for ip in [
            "127.0.0.1",
            "10.0.0.1",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "255.255.255.255",
        ] {
            assert!(is_private_ip(&ip.parse().unwrap()), "{} should be private", ip);
        }
        for ip in ["8.8.8.8", "1.1.1.1", "203.0.113.1", "100.128.0.1"] {
            assert!(!is_private_ip(&ip.parse().unwrap()), "{} should be public", ip);
        }
    }

    #[test]
    fn test_is_private_ip_v6() {
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(is_private_ip(&"::".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));
        assert!(!is_private_ip(&"2607:f8b0:4004:800::200e".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_resolve_url_blocks_loopback() {
        let result = resolve_url("http://127.0.0.1:9/form.pdf", false, MAX).await;
        assert!(matches!(result, Err(Error::SsrfBlocked { .. })));
    }
}
