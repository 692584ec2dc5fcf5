use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

use smsnote_core::fs::write_atomic;

/// Random 256-bit token-signing secret, base64 encoded.
pub fn generate_secret() -> anyhow::Result<Zeroizing<String>> {
    let mut bytes = Zeroizing::new([0u8; 32]);
    getrandom::getrandom(&mut bytes[..])
        .map_err(|e| anyhow::anyhow!("Failed to generate secret: {}", e))?;
    Ok(Zeroizing::new(STANDARD.encode(&bytes[..])))
}

/// Store the session token, readable by the owner only.
pub fn write_token_file(path: &Path, token: &str) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    write_atomic(path, token.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to write token {}: {}", path.display(), e))
}

/// The stored session token, or `None` when logged out.
pub fn read_token_file(path: &Path) -> anyhow::Result<Option<Zeroizing<String>>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let token = Zeroizing::new(contents.trim().to_string());
            if token.is_empty() {
                Ok(None)
            } else {
                Ok(Some(token))
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(anyhow::anyhow!(
            "Failed to read token {}: {}",
            path.display(),
            err
        )),
    }
}

/// Remove the stored session token. Returns false if there was none.
pub fn clear_token_file(path: &Path) -> anyhow::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(anyhow::anyhow!(
            "Failed to remove token {}: {}",
            path.display(),
            err
        )),
    }
}

pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!("Failed to create directory {}: {}", parent.display(), e)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_is_random_base64() {
        let first = generate_secret().unwrap();
        let second = generate_secret().unwrap();
        assert_ne!(*first, *second);
        assert_eq!(STANDARD.decode(first.as_bytes()).unwrap().len(), 32);
    }

    #[test]
    fn test_token_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token");

        assert!(read_token_file(&path).unwrap().is_none());
        write_token_file(&path, "abc.def.ghi").unwrap();
        assert_eq!(read_token_file(&path).unwrap().unwrap().as_str(), "abc.def.ghi");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert!(clear_token_file(&path).unwrap());
        assert!(!clear_token_file(&path).unwrap());
        assert!(read_token_file(&path).unwrap().is_none());
    }
}
