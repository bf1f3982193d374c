//! KeePass database operations wrapper.

use crate::error::{MigrateError, MigrateResult};
use crate::models::{CustomField, Entry, Group};
use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use keepass::db::{Node, Value};
use keepass::config::{DatabaseConfig, DatabaseVersion};
use keepass::{Database, DatabaseKey};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const TITLE: &str = "Title";
pub const USERNAME: &str = "UserName";
pub const PASSWORD: &str = "Password";
pub const URL: &str = "URL";
pub const NOTES: &str = "Notes";

/// Keys KeePass reserves for the standard entry attributes.
pub const STANDARD_FIELDS: [&str; 5] = [TITLE, USERNAME, PASSWORD, URL, NOTES];

/// Wrapper around the KeePass database for easier operations.
///
/// Groups and entries are addressed by the string form of their UUID.
pub struct KeepassDatabase {
    db: Database,
    path: PathBuf,
    key: DatabaseKey,
}

impl KeepassDatabase {
    /// Create a new, empty database. Nothing is written until [`save`](Self::save).
    pub fn create(path: impl AsRef<Path>, password: &str, keyfile: Option<&Path>) -> Result<Self> {
        let path = path.as_ref();
        let key = Self::build_key(password, keyfile)?;

        let mut db = Database::new(DatabaseConfig::default());
        db.meta.database_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());

        tracing::info!("Created new database for {}", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
            key,
        })
    }

    /// Open and unlock a KeePass database.
    pub fn unlock(path: impl AsRef<Path>, password: &str, keyfile: Option<&Path>) -> Result<Self> {
        let path = path.as_ref();
        let key = Self::build_key(password, keyfile)?;

        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open database file: {}", path.display()))?;
        let db = Database::open(&mut file, key.clone())
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Only KDBX4 can be written back
        if !matches!(db.config.version, DatabaseVersion::KDB4(_)) {
            anyhow::bail!(
                "{} uses {:?}, only KDBX4 databases can be migrated into; upgrade it in KeePass first",
                path.display(),
                db.config.version
            );
        }

        tracing::info!("Unlocked database {}", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
            key,
        })
    }

    fn build_key(password: &str, keyfile: Option<&Path>) -> Result<DatabaseKey> {
        let key = DatabaseKey::new().with_password(password);
        match keyfile {
            Some(keyfile) => {
                let mut file = std::fs::File::open(keyfile)
                    .with_context(|| format!("Failed to open key file: {}", keyfile.display()))?;
                key.with_keyfile(&mut file)
                    .with_context(|| format!("Failed to read key file: {}", keyfile.display()))
            }
            None => Ok(key),
        }
    }

    /// Path the database is saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// UUID of the root group.
    pub fn root_uuid(&self) -> String {
        self.db.root.uuid.to_string()
    }

    /// Get the root group of the database.
    pub fn root_group(&self) -> Group {
        convert_group(&self.db.root)
    }

    /// Find a group by its name path below the root. An empty path is the root.
    pub fn find_group_by_path(&self, path: &[String]) -> Option<String> {
        let mut group = &self.db.root;
        for name in path {
            group = child_group(group, name)?;
        }
        Some(group.uuid.to_string())
    }

    /// Create a group named `name` under `parent`.
    pub fn create_group(&mut self, parent: &str, name: &str) -> MigrateResult<String> {
        let parent_group = self
            .group_mut(parent)
            .ok_or_else(|| MigrateError::Container(parent.to_string()))?;

        let group = keepass::db::Group::new(name);
        let uuid = group.uuid.to_string();
        parent_group.children.push(Node::Group(group));

        tracing::debug!("Created group {} ({})", name, uuid);
        Ok(uuid)
    }

    /// Find the group at `path`, creating any missing segments.
    pub fn ensure_group_path(&mut self, path: &[String]) -> MigrateResult<String> {
        let mut current = self.root_uuid();
        for (depth, name) in path.iter().enumerate() {
            current = match self.find_group_by_path(&path[..=depth]) {
                Some(uuid) => uuid,
                None => self.create_group(&current, name)?,
            };
        }
        Ok(current)
    }

    /// Find entries directly inside `group` whose title matches exactly.
    pub fn find_entries(&self, title: &str, group: &str, first: bool) -> MigrateResult<Vec<Entry>> {
        let group_ref = find_group(&self.db.root, group)
            .ok_or_else(|| MigrateError::Container(group.to_string()))?;

        let matches = group_ref.children.iter().filter_map(|node| match node {
            Node::Entry(e) if e.get_title() == Some(title) => Some(convert_entry(e)),
            _ => None,
        });

        Ok(if first {
            matches.take(1).collect()
        } else {
            matches.collect()
        })
    }

    /// Add a new entry to `group`, returning its UUID.
    pub fn add_entry(
        &mut self,
        group: &str,
        title: &str,
        username: &str,
        password: &str,
        url: &str,
    ) -> MigrateResult<String> {
        let group_ref = self
            .group_mut(group)
            .ok_or_else(|| MigrateError::Container(group.to_string()))?;

        let mut entry = keepass::db::Entry::new();
        set_field(&mut entry, TITLE, title, false);
        set_field(&mut entry, USERNAME, username, false);
        set_field(&mut entry, PASSWORD, password, true);
        set_field(&mut entry, URL, url, false);
        let uuid = entry.uuid.to_string();
        group_ref.children.push(Node::Entry(entry));

        Ok(uuid)
    }

    /// Set or overwrite a custom property on an entry.
    pub fn set_custom_property(
        &mut self,
        entry: &str,
        name: &str,
        value: &str,
        protected: bool,
    ) -> MigrateResult<()> {
        let entry_ref = self
            .entry_mut(entry)
            .ok_or_else(|| MigrateError::EntryNotFound(entry.to_string()))?;
        set_field(entry_ref, name, value, protected);
        Ok(())
    }

    /// Find an entry by UUID.
    pub fn get_entry(&self, uuid: &str) -> Option<Entry> {
        find_entry(&self.db.root, uuid).map(convert_entry)
    }

    pub(crate) fn group_mut(&mut self, uuid: &str) -> Option<&mut keepass::db::Group> {
        find_group_mut(&mut self.db.root, uuid)
    }

    pub(crate) fn entry_mut(&mut self, uuid: &str) -> Option<&mut keepass::db::Entry> {
        find_entry_mut(&mut self.db.root, uuid)
    }

    /// Save the database to disk.
    ///
    /// The database is serialized in memory and written to a temporary file
    /// next to the target, which then replaces it. A failed save leaves the
    /// existing file untouched.
    pub fn save(&self) -> Result<()> {
        let mut buffer = Vec::new();
        self.db
            .save(&mut buffer, self.key.clone())
            .with_context(|| "Failed to save database")?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        file.write_all(&buffer)
            .and_then(|_| file.as_file().sync_all())
            .with_context(|| format!("Failed to write temporary file in {}", dir.display()))?;
        file.persist(&self.path)
            .with_context(|| format!("Failed to replace database file: {}", self.path.display()))?;

        tracing::info!("Saved database to {}", self.path.display());
        Ok(())
    }
}

/// Write a string field, choosing protected or plain storage.
pub(crate) fn set_field(entry: &mut keepass::db::Entry, key: &str, value: &str, protected: bool) {
    let value = if protected {
        Value::Protected(value.as_bytes().into())
    } else {
        Value::Unprotected(value.to_string())
    };
    entry.fields.insert(key.to_string(), value);
}

/// Stamp the entry's last modification time with the current time.
pub(crate) fn touch(entry: &mut keepass::db::Entry) {
    entry
        .times
        .set_last_modification(Utc::now().naive_utc().trunc_subsecs(0));
}

/// Convert a keepass::Group to our Group model.
fn convert_group(kg: &keepass::db::Group) -> Group {
    Group {
        uuid: kg.uuid.to_string(),
        name: kg.name.clone(),
        children: kg
            .children
            .iter()
            .filter_map(|node| {
                if let Node::Group(g) = node {
                    Some(convert_group(g))
                } else {
                    None
                }
            })
            .collect(),
        entries: kg
            .children
            .iter()
            .filter_map(|node| {
                if let Node::Entry(e) = node {
                    Some(convert_entry(e))
                } else {
                    None
                }
            })
            .collect(),
    }
}

/// Convert a keepass::Entry to our Entry model.
pub(crate) fn convert_entry(ke: &keepass::db::Entry) -> Entry {
    let mut custom_fields = HashMap::new();

    for (key, val) in &ke.fields {
        if STANDARD_FIELDS.contains(&key.as_str()) {
            continue;
        }

        let protected = match val {
            Value::Unprotected(_) => false,
            Value::Protected(_) => true,
            // Binary attachments are not string properties
            _ => continue,
        };
        if let Some(s) = ke.get(key) {
            custom_fields.insert(
                key.clone(),
                CustomField {
                    value: s.to_string(),
                    protected,
                },
            );
        }
    }

    Entry {
        uuid: ke.uuid.to_string(),
        title: ke.get_title().unwrap_or_default().to_string(),
        username: ke.get_username().unwrap_or_default().to_string(),
        password: ke.get_password().unwrap_or_default().to_string(),
        url: ke.get_url().unwrap_or_default().to_string(),
        notes: ke.get(NOTES).unwrap_or_default().to_string(),
        custom_fields,
        modified: ke.times.get_last_modification().copied(),
    }
}

fn child_group<'a>(group: &'a keepass::db::Group, name: &str) -> Option<&'a keepass::db::Group> {
    group.children.iter().find_map(|node| match node {
        Node::Group(g) if g.name == name => Some(g),
        _ => None,
    })
}

fn find_group<'a>(group: &'a keepass::db::Group, uuid: &str) -> Option<&'a keepass::db::Group> {
    if group.uuid.to_string() == uuid {
        return Some(group);
    }
    group.children.iter().find_map(|node| match node {
        Node::Group(g) => find_group(g, uuid),
        _ => None,
    })
}

fn find_group_mut<'a>(
    group: &'a mut keepass::db::Group,
    uuid: &str,
) -> Option<&'a mut keepass::db::Group> {
    if group.uuid.to_string() == uuid {
        return Some(group);
    }
    group.children.iter_mut().find_map(|node| match node {
        Node::Group(g) => find_group_mut(g, uuid),
        _ => None,
    })
}

fn find_entry<'a>(group: &'a keepass::db::Group, uuid: &str) -> Option<&'a keepass::db::Entry> {
    group.children.iter().find_map(|node| match node {
        Node::Entry(e) if e.uuid.to_string() == uuid => Some(e),
        Node::Group(g) => find_entry(g, uuid),
        _ => None,
    })
}

fn find_entry_mut<'a>(
    group: &'a mut keepass::db::Group,
    uuid: &str,
) -> Option<&'a mut keepass::db::Entry> {
    group.children.iter_mut().find_map(|node| match node {
        Node::Entry(e) if e.uuid.to_string() == uuid => Some(e),
        Node::Group(g) => find_entry_mut(g, uuid),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_db() -> (tempfile::TempDir, KeepassDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = KeepassDatabase::create(dir.path().join("test.kdbx"), "testpassword", None).unwrap();
        (dir, db)
    }

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_path_is_root() {
        let (_dir, db) = new_db();
        assert_eq!(db.find_group_by_path(&[]), Some(db.root_uuid()));
    }

    #[test]
    fn test_ensure_group_path_creates_once() {
        let (_dir, mut db) = new_db();

        let first = db.ensure_group_path(&path(&["Work", "Clients"])).unwrap();
        let second = db.ensure_group_path(&path(&["Work", "Clients"])).unwrap();
        assert_eq!(first, second);

        let root = db.root_group();
        assert_eq!(root.children.len(), 1);
        let work = root.child("Work").unwrap();
        assert_eq!(work.children.len(), 1);
        assert_eq!(work.child("Clients").unwrap().uuid, first);
        assert_eq!(db.find_group_by_path(&path(&["Work", "Clients"])), Some(first));
    }

    #[test]
    fn test_create_group_in_unknown_parent() {
        let (_dir, mut db) = new_db();
        let result = db.create_group("not-a-uuid", "Orphan");
        assert_eq!(result, Err(MigrateError::Container("not-a-uuid".to_string())));
    }

    #[test]
    fn test_add_and_find_entries() {
        let (_dir, mut db) = new_db();
        let group = db.create_group(&db.root_uuid(), "Test Group").unwrap();

        let uuid = db
            .add_entry(&group, "Test Entry", "testuser", "oldpassword", "https://example.com")
            .unwrap();
        db.add_entry(&group, "Test Entry", "other", "", "").unwrap();
        db.add_entry(&db.root_uuid(), "Test Entry", "root", "", "").unwrap();

        let all = db.find_entries("Test Entry", &group, false).unwrap();
        assert_eq!(all.len(), 2);

        let first = db.find_entries("Test Entry", &group, true).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].uuid, uuid);
        assert_eq!(first[0].password, "oldpassword");
        assert_eq!(first[0].url, "https://example.com");

        assert!(db.find_entries("test entry", &group, false).unwrap().is_empty());
    }

    #[test]
    fn test_set_custom_property_protection() {
        let (_dir, mut db) = new_db();
        let root = db.root_uuid();
        let uuid = db.add_entry(&root, "Entry", "", "", "").unwrap();

        db.set_custom_property(&uuid, "PIN", "1234", true).unwrap();
        db.set_custom_property(&uuid, "Color", "blue", false).unwrap();

        let entry = db.get_entry(&uuid).unwrap();
        assert_eq!(entry.custom_property("PIN"), Some("1234"));
        assert!(entry.is_protected("PIN"));
        assert_eq!(entry.custom_property("Color"), Some("blue"));
        assert!(!entry.is_protected("Color"));
        assert!(!entry.custom_fields.contains_key(PASSWORD));
    }

    #[test]
    fn test_failed_save_keeps_existing_file() {
        let (dir, db) = new_db();
        db.save().unwrap();
        let path = dir.path().join("test.kdbx");
        let before = std::fs::read(&path).unwrap();

        let mut reopened = KeepassDatabase::unlock(&path, "testpassword", None).unwrap();
        let root = reopened.root_uuid();
        reopened.add_entry(&root, "Unsaved", "", "", "").unwrap();
        reopened.db.config.version = DatabaseVersion::KDB3(1);

        assert!(reopened.save().is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
        let again = KeepassDatabase::unlock(&path, "testpassword", None).unwrap();
        assert_eq!(again.root_group().entry_count(), 0);
    }

    #[test]
    fn test_save_replaces_file_without_leftovers() {
        let (dir, mut db) = new_db();
        db.save().unwrap();
        let root = db.root_uuid();
        db.add_entry(&root, "Second save", "", "", "").unwrap();
        db.save().unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("test.kdbx")]);

        let reopened = KeepassDatabase::unlock(dir.path().join("test.kdbx"), "testpassword", None).unwrap();
        assert_eq!(reopened.root_group().entry_count(), 1);
    }

    #[test]
    fn test_set_custom_property_unknown_entry() {
        let (_dir, mut db) = new_db();
        let result = db.set_custom_property("missing", "A", "B", false);
        assert_eq!(result, Err(MigrateError::EntryNotFound("missing".to_string())));
    }
}
