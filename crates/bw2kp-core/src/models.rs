//! Snapshot types for the destination database.

use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Represents a group (folder) in the database tree.
#[derive(Debug, Clone)]
pub struct Group {
    pub uuid: String,
    pub name: String,
    pub children: Vec<Group>,
    pub entries: Vec<Entry>,
}

impl Group {
    /// Find a direct child group by name.
    pub fn child(&self, name: &str) -> Option<&Group> {
        self.children.iter().find(|g| g.name == name)
    }

    /// Number of entries in this group and all of its descendants.
    pub fn entry_count(&self) -> usize {
        self.entries.len() + self.children.iter().map(Group::entry_count).sum::<usize>()
    }
}

/// Represents a password entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub uuid: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
    pub custom_fields: HashMap<String, CustomField>,
    /// Last modification time (UTC).
    pub modified: Option<NaiveDateTime>,
}

/// A custom string property and its storage mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomField {
    pub value: String,
    /// Stored as a protected (hidden) value.
    pub protected: bool,
}

impl Entry {
    /// Value of a custom property, regardless of protection.
    pub fn custom_property(&self, name: &str) -> Option<&str> {
        self.custom_fields.get(name).map(|f| f.value.as_str())
    }

    /// Whether the named custom property is stored protected.
    pub fn is_protected(&self, name: &str) -> bool {
        self.custom_fields.get(name).is_some_and(|f| f.protected)
    }
}
