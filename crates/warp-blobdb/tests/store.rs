//! Contract tests run against every backend

use tempfile::TempDir;

use warp_blobdb::{DbBackend, DbError, open_for_read, open_for_write};

fn write_records(dir: &TempDir, backend: DbBackend, keys: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(format!("db-{}", backend));
    let mut writer = open_for_write(&path, backend).unwrap();
    for key in keys {
        writer.put(key, format!("value-{}", key).as_bytes()).unwrap();
    }
    writer.close().unwrap();
    path
}

#[test]
fn test_round_trip_preserves_write_order() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = write_records(&dir, backend, &["9", "10", "1", "b", "a"]);

        let reader = open_for_read(&path, backend).unwrap();
        assert_eq!(reader.keys().unwrap(), vec!["9", "10", "1", "b", "a"], "{backend}");
        assert_eq!(reader.len(), 5);
        assert_eq!(reader.get("10").unwrap(), b"value-10");
        assert!(reader.contains("a").unwrap());
        assert!(!reader.contains("c").unwrap());
    }
}

#[test]
fn test_duplicate_key_rejected() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let mut writer = open_for_write(&path, backend).unwrap();

        writer.put("x", b"1").unwrap();
        let err = writer.put("x", b"2").unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey(ref k) if k == "x"), "{backend}");
        assert_eq!(writer.len(), 1);
    }
}

#[test]
fn test_missing_key() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = write_records(&dir, backend, &["present"]);

        let reader = open_for_read(&path, backend).unwrap();
        let err = reader.get("unknown").unwrap_err();
        assert!(matches!(err, DbError::KeyNotFound(ref k) if k == "unknown"));
    }
}

#[test]
fn test_open_missing_database() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let err = open_for_read(dir.path().join("absent"), backend).err().unwrap();
        assert!(err.is_not_found(), "{backend}: {err}");
    }
}

#[test]
fn test_write_requires_parent_directory() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("db");
        let err = open_for_write(&path, backend).err().unwrap();
        assert!(err.is_not_found());
        assert!(!path.exists());
    }
}

#[test]
fn test_dropped_writer_is_flushed() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        {
            let mut writer = open_for_write(&path, backend).unwrap();
            writer.put("a", b"1").unwrap();
            writer.put("b", b"2").unwrap();
            // dropped without close()
        }

        let reader = open_for_read(&path, backend).unwrap();
        assert_eq!(reader.keys().unwrap(), vec!["a", "b"]);
    }
}

#[test]
fn test_rewrite_truncates() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        write_records(&dir, backend, &["a", "b", "c"]);
        let path = write_records(&dir, backend, &["d"]);

        let reader = open_for_read(&path, backend).unwrap();
        assert_eq!(reader.keys().unwrap(), vec!["d"]);
    }
}

#[test]
fn test_close_read_is_idempotent() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = write_records(&dir, backend, &["a"]);

        let mut reader = open_for_read(&path, backend).unwrap();
        reader.close();
        reader.close();
        assert!(reader.is_closed());
        assert_eq!(reader.len(), 0);
        assert!(matches!(reader.get("a"), Err(DbError::Closed)));
        assert!(matches!(reader.keys(), Err(DbError::Closed)));
    }
}

#[test]
fn test_backend_mismatch_fails() {
    let dir = TempDir::new().unwrap();
    let sled_path = write_records(&dir, DbBackend::Sled, &["a"]);
    let minidb_path = write_records(&dir, DbBackend::MiniDb, &["a"]);

    assert!(open_for_read(&sled_path, DbBackend::MiniDb).is_err());
    assert!(open_for_read(&minidb_path, DbBackend::Sled).is_err());
}

#[test]
fn test_write_refuses_foreign_directory() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("project");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("important.txt"), b"keep me").unwrap();

        let err = open_for_write(&path, backend).err().unwrap();
        assert!(matches!(err, DbError::Occupied { .. }), "{backend}: {err}");
        assert_eq!(std::fs::read(path.join("important.txt")).unwrap(), b"keep me");
    }
}

#[test]
fn test_write_refuses_foreign_file() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"keep me").unwrap();

        let err = open_for_write(&path, backend).err().unwrap();
        assert!(matches!(err, DbError::Occupied { .. }), "{backend}: {err}");
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }
}

#[test]
fn test_write_refuses_other_backend() {
    let dir = TempDir::new().unwrap();
    let sled_path = write_records(&dir, DbBackend::Sled, &["a"]);
    let minidb_path = write_records(&dir, DbBackend::MiniDb, &["a"]);

    assert!(matches!(
        open_for_write(&sled_path, DbBackend::MiniDb),
        Err(DbError::Occupied { .. })
    ));
    assert!(matches!(
        open_for_write(&minidb_path, DbBackend::Sled),
        Err(DbError::Occupied { .. })
    ));
    assert_eq!(open_for_read(&sled_path, DbBackend::Sled).unwrap().keys().unwrap(), vec!["a"]);
    assert_eq!(open_for_read(&minidb_path, DbBackend::MiniDb).unwrap().keys().unwrap(), vec!["a"]);
}

#[test]
fn test_write_replaces_empty_directory() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        std::fs::create_dir(&path).unwrap();

        let mut writer = open_for_write(&path, backend).unwrap();
        writer.put("a", b"1").unwrap();
        writer.close().unwrap();
        assert_eq!(open_for_read(&path, backend).unwrap().keys().unwrap(), vec!["a"]);
    }
}

#[test]
fn test_read_leaves_empty_directory_untouched() {
    for backend in DbBackend::ALL {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::create_dir(&path).unwrap();

        let err = open_for_read(&path, backend).err().unwrap();
        assert!(err.is_not_found(), "{backend}: {err}");
        assert_eq!(std::fs::read_dir(&path).unwrap().count(), 0, "{backend}");
    }
}
