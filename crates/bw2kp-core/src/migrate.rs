//! Migration of a whole export into a database.

use crate::database::KeepassDatabase;
use crate::error::{MigrateError, MigrateResult};
use crate::export::Export;
use crate::reconcile::{self, Outcome};
use std::collections::HashMap;

/// What to do with an item that has no name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidRecordPolicy {
    /// Log it, record it in the report and carry on.
    #[default]
    Skip,
    /// Stop the migration at the first invalid item.
    Abort,
}

/// Options for [`migrate`].
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Group path below the root that receives all items.
    pub target_group: Vec<String>,
    /// Recreate the export's folders as nested groups.
    pub mirror_folders: bool,
    pub on_invalid: InvalidRecordPolicy,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            target_group: Vec::new(),
            mirror_folders: true,
            on_invalid: InvalidRecordPolicy::Skip,
        }
    }
}

/// An item that was not migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    /// Position of the item in the export.
    pub index: usize,
    pub name: Option<String>,
    pub reason: String,
}

/// Counts of what a migration did.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedItem>,
}

impl MigrationReport {
    /// Number of items written to the database.
    pub fn migrated(&self) -> usize {
        self.created + self.updated
    }
}

/// Reconcile every item of `export` into `db`.
///
/// Container errors always stop the migration. Items without a name are
/// handled according to `options.on_invalid`; with `Abort` the error is
/// returned and items already written stay in the (unsaved) database.
pub fn migrate(
    db: &mut KeepassDatabase,
    export: &Export,
    options: &MigrateOptions,
) -> MigrateResult<MigrationReport> {
    let mut report = MigrationReport::default();
    let mut groups: HashMap<Vec<String>, String> = HashMap::new();

    for (index, item) in export.items.iter().enumerate() {
        if let Err(e) = reconcile::require_title(item) {
            let reason = match e {
                MigrateError::InvalidRecord(reason) => reason,
                other => other.to_string(),
            };
            match options.on_invalid {
                InvalidRecordPolicy::Abort => {
                    return Err(MigrateError::InvalidRecord(format!("item #{}: {}", index, reason)));
                }
                InvalidRecordPolicy::Skip => {
                    tracing::warn!("Skipping item #{}: {}", index, reason);
                    report.skipped.push(SkippedItem {
                        index,
                        name: item.name.clone(),
                        reason,
                    });
                    continue;
                }
            }
        }

        let mut path = options.target_group.clone();
        if options.mirror_folders {
            path.extend(export.folder_path(item.folder_id.as_deref()));
        }

        let group = match groups.get(&path) {
            Some(uuid) => uuid.clone(),
            None => {
                let uuid = db.ensure_group_path(&path)?;
                groups.insert(path, uuid.clone());
                uuid
            }
        };

        let reconciled = reconcile::reconcile(db, &group, item)?;
        match reconciled.outcome {
            Outcome::Created => report.created += 1,
            Outcome::Updated => report.updated += 1,
        }
    }

    tracing::info!(
        "Migrated {} items ({} created, {} updated), skipped {}",
        report.migrated(),
        report.created,
        report.updated,
        report.skipped.len()
    );
    Ok(report)
}
