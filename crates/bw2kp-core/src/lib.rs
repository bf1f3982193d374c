//! Core of bw2kp: Bitwarden export to KeePass migration.
//!
//! This crate provides the export model, the KeePass database wrapper and
//! the per-item reconciliation used by the command-line frontend.

pub mod database;
pub mod error;
pub mod export;
pub mod migrate;
pub mod models;
pub mod reconcile;

pub use database::KeepassDatabase;
pub use error::{MigrateError, MigrateResult};
pub use export::{Export, Field, FieldKind, Folder, Item, Login, LoginUri};
pub use migrate::{migrate, InvalidRecordPolicy, MigrateOptions, MigrationReport, SkippedItem};
pub use models::{CustomField, Entry, Group};
pub use reconcile::{reconcile, Outcome, Reconciled};
