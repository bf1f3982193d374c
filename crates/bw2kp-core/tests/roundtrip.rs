//! Migrate, save, and reopen a database from disk.

use bw2kp_core::{migrate, Export, KeepassDatabase, MigrateOptions};

const EXPORT: &str = r#"{
    "encrypted": false,
    "folders": [{ "id": "f1", "name": "Personal" }],
    "items": [
        {
            "id": "i1",
            "folderId": "f1",
            "type": 1,
            "name": "Test Entry",
            "notes": "Test notes",
            "login": {
                "username": "testuser",
                "password": "testpassword",
                "uris": [{ "uri": "https://example.com" }, { "uri": "https://login.example.com" }]
            },
            "fields": [
                { "name": "Custom Field 1", "value": "Custom Value 1", "type": 0 },
                { "name": "Custom Field 2", "value": "Custom Value 2", "type": 1 }
            ]
        }
    ]
}"#;

fn migrate_and_save(db: &mut KeepassDatabase) {
    let export = Export::from_json(EXPORT).unwrap();
    let report = migrate(db, &export, &MigrateOptions::default()).unwrap();
    assert_eq!(report.created, 1);
    db.save().unwrap();
}

fn assert_persisted(db: &KeepassDatabase) {
    let root = db.root_group();
    let personal = root.child("Personal").unwrap();
    let entry = &personal.entries[0];

    assert_eq!(entry.title, "Test Entry");
    assert_eq!(entry.username, "testuser");
    assert_eq!(entry.password, "testpassword");
    assert_eq!(entry.url, "https://example.com");
    assert_eq!(entry.notes, "Test notes");
    assert_eq!(entry.custom_property("URL 2"), Some("https://login.example.com"));
    assert_eq!(entry.custom_property("Custom Field 1"), Some("Custom Value 1"));
    assert_eq!(entry.custom_property("Custom Field 2"), Some("Custom Value 2"));
    assert!(!entry.is_protected("Custom Field 1"));
    assert!(entry.is_protected("Custom Field 2"));
}

#[test]
fn saved_database_reopens_with_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.kdbx");

    let mut db = KeepassDatabase::create(&path, "master", None).unwrap();
    migrate_and_save(&mut db);

    let reopened = KeepassDatabase::unlock(&path, "master", None).unwrap();
    assert_persisted(&reopened);
}

#[test]
fn rerun_against_saved_database_updates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.kdbx");

    let mut db = KeepassDatabase::create(&path, "master", None).unwrap();
    migrate_and_save(&mut db);

    let mut reopened = KeepassDatabase::unlock(&path, "master", None).unwrap();
    let export = Export::from_json(EXPORT).unwrap();
    let report = migrate(&mut reopened, &export, &MigrateOptions::default()).unwrap();

    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 1);
    assert_eq!(reopened.root_group().entry_count(), 1);
}

#[test]
fn wrong_password_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.kdbx");

    let mut db = KeepassDatabase::create(&path, "master", None).unwrap();
    migrate_and_save(&mut db);

    let err = KeepassDatabase::unlock(&path, "not-master", None).err().unwrap();
    assert!(err.to_string().contains("vault.kdbx"));
}

#[test]
fn key_file_is_required_when_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.kdbx");
    let keyfile = dir.path().join("vault.key");
    std::fs::write(&keyfile, b"some arbitrary key file contents").unwrap();

    let mut db = KeepassDatabase::create(&path, "master", Some(keyfile.as_path())).unwrap();
    migrate_and_save(&mut db);

    assert!(KeepassDatabase::unlock(&path, "master", None).is_err());
    let reopened = KeepassDatabase::unlock(&path, "master", Some(keyfile.as_path())).unwrap();
    assert_persisted(&reopened);
}

#[test]
fn missing_database_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.kdbx");

    let err = KeepassDatabase::unlock(&path, "master", None).err().unwrap();
    assert!(err.to_string().contains("absent.kdbx"));
}
