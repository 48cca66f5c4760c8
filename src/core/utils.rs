use base64::{engine::general_purpose, Engine as _};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use super::record::InvocationKey;

/// Ensure directory exists.
pub fn ensure_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Unable to create directory {}: {}", path.display(), e))?;
    }
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o700)).ok();
    }
    Ok(())
}

/// Base directory for configuration and journals, `~/.durable-chain`.
pub fn home_dir() -> Result<PathBuf, String> {
    let home =
        std::env::var("HOME").map_err(|_| "Unable to determine HOME directory".to_string())?;
    Ok(PathBuf::from(home).join(".durable-chain"))
}

/// File name for an invocation key. Keys are arbitrary caller strings, so they are
/// encoded to stay within one path component.
pub fn key_file_name(key: &InvocationKey) -> String {
    format!(
        "{}.json",
        general_purpose::URL_SAFE_NO_PAD.encode(key.as_str().as_bytes())
    )
}

/// Inverse of [`key_file_name`].
pub fn key_from_file_name(name: &str) -> Option<InvocationKey> {
    let stem = name.strip_suffix(".json")?;
    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(stem).ok()?;
    InvocationKey::new(String::from_utf8(bytes).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::MAX_KEY_LEN;

    #[test]
    fn key_file_names_are_single_components() {
        let key = InvocationKey::new("tenant/../report 2024").unwrap();
        let name = key_file_name(&key);
        assert!(!name.contains('/'));
        assert!(name.ends_with(".json"));
        assert_eq!(key_from_file_name(&name), Some(key));
    }

    #[test]
    fn foreign_files_do_not_decode() {
        assert_eq!(key_from_file_name("notes.txt"), None);
        assert_eq!(key_from_file_name("!!!.json"), None);
    }

    #[test]
    fn longest_key_fits_in_a_file_name() {
        let key = InvocationKey::new("é".repeat(MAX_KEY_LEN / 2)).unwrap();
        let name = key_file_name(&key);
        assert!(name.len() <= 255, "{} bytes", name.len());
        assert_eq!(key_from_file_name(&name), Some(key));
    }
}
