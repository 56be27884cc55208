//! redb table definitions for the autoscaler state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Policy records keyed by `{app_id}`.
pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");

/// Instance metric history keyed by `{app_id}:{metric}:{collected_at}:{instance_index}`.
pub const APP_METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("app_metrics");

/// Binding records keyed by `{binding_id}`.
pub const BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("bindings");

/// Shape shared by every table: string keys, JSON byte values.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
