//! Create-or-update of a single KeePass entry from a Bitwarden item.
//!
//! The entry is matched by exact title among the direct children of the
//! target group; the first match wins when titles are duplicated. Standard
//! attributes are overwritten, custom properties are added or overwritten
//! by name and never removed.


use crate::database::{self, KeepassDatabase, NOTES, PASSWORD, STANDARD_FIELDS, TITLE, URL, USERNAME};
use crate::error::{MigrateError, MigrateResult};
use crate::export::{FieldKind, Item};
use crate::models::Entry;
use keepass::db::Node;

/// Property holding a login's TOTP secret, as KeePassXC reads it.
pub const OTP_PROPERTY: &str = "otp";

/// Whether the entry was inserted or an existing one was overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
}

/// Result of reconciling one item.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Snapshot of the destination entry after the write.
    pub entry: Entry,
    pub outcome: Outcome,
}

/// Attribute values derived from an item, computed before touching the database.
struct MappedItem<'a> {
    title: &'a str,
    username: &'a str,
    password: &'a str,
    url: &'a str,
    notes: &'a str,
    properties: Vec<(String, &'a str, bool)>,
}

/// Validate that an item carries the title used as its match key.
pub(crate) fn require_title(item: &Item) -> MigrateResult<&str> {
    item.title().ok_or_else(|| match item.id.as_deref() {
        Some(id) => MigrateError::InvalidRecord(format!("item {} has no name", id)),
        None => MigrateError::InvalidRecord("item has no name".to_string()),
    })
}

/// Custom property name for a source field, or `None` if it cannot be stored.
///
/// Names colliding with a standard attribute get a ` (custom)` suffix.
pub fn property_name(field_name: &str) -> Option<String> {
    if field_name.is_empty() {
        None
    } else if STANDARD_FIELDS.contains(&field_name) {
        Some(format!("{} (custom)", field_name))
    } else {
        Some(field_name.to_string())
    }
}

impl<'a> MappedItem<'a> {
    fn from_item(title: &'a str, item: &'a Item) -> Self {
        let login = item.login.as_ref();
        let uris = login.map(|l| l.uris.as_slice()).unwrap_or_default();

        let mut properties = Vec::new();

        // KeePass has a single URL field; keep the rest as numbered properties
        for (index, uri) in uris.iter().enumerate().skip(1) {
            if !uri.uri.is_empty() {
                properties.push((format!("URL {}", index + 1), uri.uri.as_str(), false));
            }
        }

        if let Some(totp) = login.and_then(|l| l.totp.as_deref()).filter(|t| !t.is_empty()) {
            properties.push((OTP_PROPERTY.to_string(), totp, true));
        }

        for field in &item.fields {
            match property_name(&field.name) {
                Some(name) => {
                    properties.push((name, field.value.as_str(), field.kind == FieldKind::Protected))
                }
                None => tracing::warn!("Skipping unnamed custom field on {}", title),
            }
        }

        Self {
            title,
            username: login.and_then(|l| l.username.as_deref()).unwrap_or_default(),
            password: login.and_then(|l| l.password.as_deref()).unwrap_or_default(),
            url: uris.first().map(|u| u.uri.as_str()).unwrap_or_default(),
            notes: item.notes.as_deref().unwrap_or_default(),
            properties,
        }
    }

    fn apply(&self, entry: &mut keepass::db::Entry) {
        database::set_field(entry, USERNAME, self.username, false);
        database::set_field(entry, PASSWORD, self.password, true);
        database::set_field(entry, URL, self.url, false);
        database::set_field(entry, NOTES, self.notes, false);

        for (name, value, protected) in &self.properties {
            database::set_field(entry, name, value, *protected);
        }
    }
}

fn titled_entry_mut<'a>(
    group: &'a mut keepass::db::Group,
    title: &str,
) -> Option<&'a mut keepass::db::Entry> {
    group.children.iter_mut().find_map(|node| match node {
        Node::Entry(e) if e.get_title() == Some(title) => Some(e),
        _ => None,
    })
}

/// Create or update the entry for `item` inside `group`.
///
/// Fails with [`MigrateError::InvalidRecord`] when the item has no name and
/// [`MigrateError::Container`] when `group` is not in `db`. Both checks run
/// before anything is written. The database is not saved.
pub fn reconcile(db: &mut KeepassDatabase, group: &str, item: &Item) -> MigrateResult<Reconciled> {
    let title = require_title(item)?;
    let target = db
        .group_mut(group)
        .ok_or_else(|| MigrateError::Container(group.to_string()))?;

    let mapped = MappedItem::from_item(title, item);

    let outcome = if titled_entry_mut(target, mapped.title).is_some() {
        Outcome::Updated
    } else {
        let mut entry = keepass::db::Entry::new();
        database::set_field(&mut entry, TITLE, mapped.title, false);
        target.children.push(Node::Entry(entry));
        Outcome::Created
    };

    let entry = titled_entry_mut(target, mapped.title)
        .ok_or_else(|| MigrateError::Container(group.to_string()))?;
    let before = database::convert_entry(entry);
    mapped.apply(entry);

    let mut after = database::convert_entry(entry);
    if after != before {
        database::touch(entry);
        after = database::convert_entry(entry);
    }

    tracing::debug!("{:?} entry {} ({})", outcome, mapped.title, entry.uuid);
    Ok(Reconciled {
        entry: after,
        outcome,
    })
}
