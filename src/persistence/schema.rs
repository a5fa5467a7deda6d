//! Static entity → storage schema table.

use crate::domain::{Alarm, Notification};

/// Storage layout of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub entity: &'static str,
    pub table: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
}

pub const ALARM_SCHEMA: EntitySchema = EntitySchema {
    entity: "Alarm",
    table: "alarms",
    key: "id",
    columns: &["id", "content", "timestamp", "value", "quality"],
};

pub const NOTIFICATION_SCHEMA: EntitySchema = EntitySchema {
    entity: "Notification",
    table: "notifications",
    key: "id",
    columns: &["id", "content", "timestamp", "value", "quality"],
};

/// Every persisted entity, registered explicitly.
pub const ENTITY_SCHEMAS: &[EntitySchema] = &[ALARM_SCHEMA, NOTIFICATION_SCHEMA];

/// A type stored through the repository layer.
pub trait Entity: Clone + Send + Sync + 'static {
    fn schema() -> &'static EntitySchema;
}

impl Entity for Alarm {
    fn schema() -> &'static EntitySchema {
        &ALARM_SCHEMA
    }
}

impl Entity for Notification {
    fn schema() -> &'static EntitySchema {
        &NOTIFICATION_SCHEMA
    }
}

/// Look up a schema by table name.
pub fn schema_for_table(table: &str) -> Option<&'static EntitySchema> {
    ENTITY_SCHEMAS.iter().find(|s| s.table == table)
}
