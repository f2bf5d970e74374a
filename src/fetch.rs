//! Archive download: HTTP(S) via `reqwest`, FTP via `suppaftp`, into the downloads
//! cache atomically (part of C8).

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{MusselsError, Result};

/// Downloads `url` into `downloads_dir/filename` if it isn't already cached there,
/// via a temp-file-then-rename so a crash mid-download never leaves a partial file
/// under its final name.
pub fn fetch(url: &str, downloads_dir: &Path, filename: &str) -> Result<PathBuf> {
    let dest = downloads_dir.join(filename);
    if dest.exists() {
        debug!("{filename} already downloaded");
        return Ok(dest);
    }
    std::fs::create_dir_all(downloads_dir)?;
    let tmp = downloads_dir.join(format!("{filename}.part"));

    let result = if let Some(rest) = url.strip_prefix("ftp://") {
        fetch_ftp(rest, &tmp)
    } else {
        fetch_http(url, &tmp)
    };
    result.map_err(|reason| MusselsError::FetchFailed {
        url: url.to_string(),
        reason,
    })?;

    std::fs::rename(&tmp, &dest)?;
    Ok(dest)
}

fn fetch_http(url: &str, dest: &Path) -> std::result::Result<(), String> {
    let mut response = reqwest::blocking::get(url).map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP status {}", response.status()));
    }
    let mut file = std::fs::File::create(dest).map_err(|e| e.to_string())?;
    response.copy_to(&mut file).map_err(|e| e.to_string())?;
    Ok(())
}

fn fetch_ftp(rest: &str, dest: &Path) -> std::result::Result<(), String> {
    let (host, path) = rest.split_once('/').ok_or("malformed ftp url: missing path")?;
    let mut ftp = suppaftp::FtpStream::connect(format!("{host}:21")).map_err(|e| e.to_string())?;
    ftp.login("anonymous", "anonymous@").map_err(|e| e.to_string())?;

    let mut reader = ftp.retr_as_stream(path).map_err(|e| e.to_string())?;
    let mut file = std::fs::File::create(dest).map_err(|e| e.to_string())?;
    std::io::copy(&mut reader, &mut file).map_err(|e| e.to_string())?;
    ftp.finalize_retr_stream(reader).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn returns_cached_file_without_fetching() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("lib.tar.gz"), b"cached bytes").unwrap();
        let path = fetch("ftp://unreachable.invalid/lib.tar.gz", dir.path(), "lib.tar.gz").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"cached bytes");
    }

    #[test]
    fn unparseable_ftp_url_is_fetch_failed() {
        let dir = tempdir().unwrap();
        let err = fetch("ftp://host-with-no-path", dir.path(), "lib.tar.gz").unwrap_err();
        assert!(matches!(err, MusselsError::FetchFailed { .. }));
    }
}
