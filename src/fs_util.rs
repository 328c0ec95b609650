use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::GvError;

pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<(), GvError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| GvError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content).map_err(|err| {
        GvError::Filesystem(format!("write {}: {err}", tmp_path.display()))
    })?;
    fs::rename(&tmp_path, path).map_err(|err| GvError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), GvError> {
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| GvError::Filesystem(err.to_string()))?;
    write_bytes_atomic(path, &content)
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("doc.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let value: Vec<u32> = serde_json::from_str(&content).unwrap();
        assert_eq!(value, vec![1, 2, 3]);
        assert!(!path.with_extension("tmp").exists());
    }
}
