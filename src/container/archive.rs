use std::io::{Cursor, Read};
use std::path::Path;
use crate::errors::V2rError;

/// Pack one local file into a tar archive under `entry_name`.
pub fn pack_file(local_path: &Path, entry_name: &str) -> Result<Vec<u8>, V2rError> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_path_with_name(local_path, entry_name)
        .map_err(|e| V2rError::Container(format!("Failed to create archive: {}", e)))?;
    archive.into_inner()
        .map_err(|e| V2rError::Container(format!("Failed to finalize archive: {}", e)))
}

/// Pack an in-memory buffer into a tar archive under `entry_name`.
pub fn pack_bytes(entry_name: &str, data: &[u8]) -> Result<Vec<u8>, V2rError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut archive = tar::Builder::new(Vec::new());
    archive.append_data(&mut header, entry_name, data)
        .map_err(|e| V2rError::Container(format!("Failed to create archive: {}", e)))?;
    archive.into_inner()
        .map_err(|e| V2rError::Container(format!("Failed to finalize archive: {}", e)))
}

/// All regular files in an archive as `(entry path, contents)`.
pub fn unpack_files(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>, V2rError> {
    let mut archive = tar::Archive::new(Cursor::new(data));
    let entries = archive.entries()
        .map_err(|e| V2rError::Container(format!("Failed to read archive: {}", e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let mut entry = entry
            .map_err(|e| V2rError::Container(format!("Corrupt archive entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()
            .map_err(|e| V2rError::Container(format!("Invalid archive path: {}", e)))?
            .to_string_lossy()
            .into_owned();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)
            .map_err(|e| V2rError::Container(format!("Failed to read archive entry: {}", e)))?;
        files.push((path, contents));
    }
    Ok(files)
}

/// Contents of the first regular file in an archive.
pub fn unpack_first_file(data: &[u8]) -> Result<Vec<u8>, V2rError> {
    unpack_files(data)?
        .into_iter()
        .next()
        .map(|(_, contents)| contents)
        .ok_or_else(|| V2rError::Container("Archive contains no regular file".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_bytes_then_unpack() {
        let archive = pack_bytes("tmp/poc.py", b"print('hi')\n").unwrap();
        let files = unpack_files(&archive).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "tmp/poc.py");
        assert_eq!(files[0].1, b"print('hi')\n");
    }

    #[test]
    fn test_pack_file_uses_entry_name() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("local_name.py");
        std::fs::write(&local, "import os").unwrap();

        let archive = pack_file(&local, "tmp/remote_name.py").unwrap();
        let files = unpack_files(&archive).unwrap();
        assert_eq!(files[0].0, "tmp/remote_name.py");
        assert_eq!(unpack_first_file(&archive).unwrap(), b"import os");
    }

    #[test]
    fn test_pack_missing_file_fails() {
        let err = pack_file(Path::new("/nonexistent/poc.py"), "poc.py").unwrap_err();
        assert!(matches!(err, V2rError::Container(_)));
    }

    #[test]
    fn test_unpack_garbage_fails() {
        assert!(unpack_first_file(b"definitely not a tarball").is_err());
    }

    #[test]
    fn test_binary_payload_survives() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let archive = pack_bytes("blob.bin", &payload).unwrap();
        assert_eq!(unpack_first_file(&archive).unwrap(), payload);
    }
}
