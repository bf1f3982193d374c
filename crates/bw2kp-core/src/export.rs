//! Bitwarden unencrypted JSON export.
//!
//! Exports written by older clients or hand-edited files are loosely shaped:
//! keys may be missing or `null`, values may have the wrong JSON type, and
//! custom field types can carry codes we do not know about. Everything
//! except the document structure itself is defaulted value by value rather
//! than rejected, so one odd value never costs the rest of its item.

use crate::error::{MigrateError, MigrateResult};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;

/// A parsed export document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Export {
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, deserialize_with = "lenient_list")]
    pub folders: Vec<Folder>,
    #[serde(default, deserialize_with = "nullable")]
    pub items: Vec<Item>,
}

/// A source folder. Nested folders are encoded as `Parent/Child` names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Folder {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
}

/// One source record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub folder_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub login: Option<Login>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub fields: Vec<Field>,
}

impl Item {
    /// Build a record with only a name, mostly useful in tests.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// The match key, if present and non-empty.
    pub fn title(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Login credentials of an item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Login {
    #[serde(default, deserialize_with = "lenient_text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub uris: Vec<LoginUri>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub totp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginUri {
    #[serde(default, deserialize_with = "lenient_string")]
    pub uri: String,
}

impl From<&str> for LoginUri {
    fn from(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
        }
    }
}

/// A custom attribute of an item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Field {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
}

impl Field {
    pub fn plain(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            kind: FieldKind::Plain,
        }
    }

    pub fn protected(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            kind: FieldKind::Protected,
        }
    }
}

/// Storage mode of a custom attribute.
///
/// Bitwarden encodes text as `0` and hidden as `1`, either as a number or a
/// numeric string. Boolean (`2`), linked (`3`) and anything unknown are
/// carried over as plain text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub enum FieldKind {
    #[default]
    Plain,
    Protected,
}

impl From<Value> for FieldKind {
    fn from(code: Value) -> Self {
        let code = match &code {
            Value::Null => return FieldKind::Plain,
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match code {
            Some(1) => FieldKind::Protected,
            Some(_) => FieldKind::Plain,
            None => {
                tracing::warn!("Unrecognized custom field type, storing as plain text");
                FieldKind::Plain
            }
        }
    }
}

impl Export {
    /// Parse an export from its JSON text.
    pub fn from_json(json: &str) -> MigrateResult<Self> {
        let export: Export = serde_json::from_str(json)?;
        if export.encrypted {
            return Err(MigrateError::EncryptedExport);
        }
        Ok(export)
    }

    /// Read and parse an export file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export file: {}", path.display()))?;

        let export = Self::from_json(&contents)
            .with_context(|| format!("Failed to parse export file: {}", path.display()))?;

        tracing::info!(
            "Loaded {} items and {} folders from {}",
            export.items.len(),
            export.folders.len(),
            path.display()
        );
        Ok(export)
    }

    /// Group path segments for the folder an item lives in.
    ///
    /// Unknown or absent folder ids yield an empty path.
    pub fn folder_path(&self, folder_id: Option<&str>) -> Vec<String> {
        folder_id
            .and_then(|id| self.folders.iter().find(|f| f.id == id))
            .map(|f| split_path(&f.name))
            .unwrap_or_default()
    }
}

/// Split a slash-separated path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Treat an explicit `null` like a missing key.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Drop a sub-structure that does not have the expected shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match T::deserialize(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            tracing::warn!("Ignoring malformed value: {}", e);
            Ok(None)
        }
    }
}

/// Keep the well-formed elements of a list, dropping the others.
///
/// Anything other than an array or `null` yields an empty list.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let elements = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(Vec::new()),
        Value::Array(elements) => elements,
        _ => {
            tracing::warn!("Ignoring list that is not an array");
            return Ok(Vec::new());
        }
    };

    Ok(elements
        .into_iter()
        .filter_map(|element| match T::deserialize(element) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Skipping malformed list element: {}", e);
                None
            }
        })
        .collect())
}

/// Read a text value, stringifying numbers and booleans.
///
/// Arrays and objects are dropped. The offending value is not logged since
/// it may be a secret.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => {
            tracing::warn!("Ignoring structured value where text was expected");
            None
        }
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}
