use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Row};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::fields::{self, FieldKind, IterationOption, ProjectField};
use crate::model::{EpicOptionRecord, ItemPayload, Project, ProjectItem};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 1] = [Migration {
    version: 1,
    name: "baseline_sync_schema_v1",
    sql: r#"
CREATE TABLE IF NOT EXISTS project (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant TEXT NOT NULL,
    owner_login TEXT NOT NULL,
    project_number INTEGER NOT NULL,
    node_id TEXT NOT NULL UNIQUE,
    name TEXT,
    status_columns TEXT,
    last_synced_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (tenant, owner_login, project_number)
);

CREATE TABLE IF NOT EXISTS project_field (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES project(id) ON DELETE CASCADE,
    field_id TEXT NOT NULL,
    name TEXT NOT NULL,
    field_type TEXT NOT NULL,
    options TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE (project_id, field_id)
);

CREATE TABLE IF NOT EXISTS project_item (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES project(id) ON DELETE CASCADE,
    node_id TEXT NOT NULL UNIQUE,
    content_node_id TEXT,
    content_type TEXT,
    title TEXT,
    url TEXT,
    status TEXT,
    assignees TEXT,
    iteration TEXT,
    iteration_id TEXT,
    iteration_start TEXT,
    iteration_end TEXT,
    estimate REAL,
    start_date TEXT,
    end_date TEXT,
    due_date TEXT,
    epic_option_id TEXT,
    epic_name TEXT,
    field_values TEXT,
    updated_at TEXT,
    remote_updated_at TEXT,
    last_synced_at TEXT,
    last_local_edit_at TEXT,
    last_local_edit_by TEXT
);

CREATE TABLE IF NOT EXISTS epic_option (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES project(id) ON DELETE CASCADE,
    option_id TEXT,
    name TEXT NOT NULL,
    label_name TEXT,
    color TEXT,
    description TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS iteration_option (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES project(id) ON DELETE CASCADE,
    option_id TEXT NOT NULL,
    title TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT,
    UNIQUE (project_id, option_id)
);

CREATE INDEX IF NOT EXISTS idx_project_item_project ON project_item(project_id);
CREATE INDEX IF NOT EXISTS idx_project_item_content ON project_item(content_node_id);
CREATE INDEX IF NOT EXISTS idx_epic_option_project ON epic_option(project_id);
"#,
}];

/// Local relational mirror of remote boards. One connection, serialized
/// through an async mutex; SQLite calls are short enough that this is the
/// same discipline the single event loop already imposes.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let mut conn = Connection::open(path)?;
        configure_connection(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, SyncError> {
        let mut conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Registers or refreshes a board. Keyed by (tenant, owner, number);
    /// the node id and display name follow the latest fetch, while the
    /// status-column list is only initialized when previously unset.
    pub async fn upsert_project(
        &self,
        tenant: &str,
        owner_login: &str,
        project_number: i64,
        node_id: &str,
        name: Option<&str>,
        status_columns: Option<&[String]>,
    ) -> Result<Project, SyncError> {
        let conn = self.conn.lock().await;
        let now = now_rfc3339();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM project WHERE tenant = ?1 AND owner_login = ?2 AND project_number = ?3",
                params![tenant, owner_login, project_number],
                |row| row.get(0),
            )
            .optional()?;

        let columns_json = status_columns.map(json_string);
        let id = match existing {
            Some(id) => {
                conn.execute(
                    r#"
UPDATE project SET
    node_id = ?1,
    name = ?2,
    status_columns = COALESCE(status_columns, ?3),
    updated_at = ?4
WHERE id = ?5
"#,
                    params![node_id, name, columns_json, now, id],
                )?;
                id
            }
            None => {
                conn.execute(
                    r#"
INSERT INTO project (tenant, owner_login, project_number, node_id, name, status_columns, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
"#,
                    params![tenant, owner_login, project_number, node_id, name, columns_json, now],
                )?;
                conn.last_insert_rowid()
            }
        };
        project_row(&conn, id)
    }

    pub async fn project_by_id(&self, id: i64) -> Result<Option<Project>, SyncError> {
        let conn = self.conn.lock().await;
        match project_row(&conn, id) {
            Ok(project) => Ok(Some(project)),
            Err(SyncError::Storage(rusqlite::Error::QueryReturnedNoRows)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    pub async fn project_by_node_id(&self, node_id: &str) -> Result<Option<Project>, SyncError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("{PROJECT_SELECT} WHERE node_id = ?1"),
            params![node_id],
            map_project,
        )
        .optional()
        .map_err(SyncError::from)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, SyncError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("{PROJECT_SELECT} ORDER BY id ASC"))?;
        let rows = stmt.query_map([], map_project)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn set_project_synced(
        &self,
        project_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE project SET last_synced_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), project_id],
        )?;
        Ok(())
    }

    /// Replaces the field cache with the latest catalog: existing fields are
    /// updated by remote id, new ones inserted, and any field id absent from
    /// the fetch is deleted — the cache is a mirror, not an accumulator. The
    /// denormalized option caches are rebuilt from the resolved roles.
    pub async fn replace_fields(
        &self,
        project_id: i64,
        catalog: &[ProjectField],
    ) -> Result<(), SyncError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let now = now_rfc3339();

        {
            let mut existing = tx.prepare(
                "SELECT field_id FROM project_field WHERE project_id = ?1",
            )?;
            let known: Vec<String> = existing
                .query_map(params![project_id], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            for field in catalog {
                tx.execute(
                    r#"
INSERT INTO project_field (project_id, field_id, name, field_type, options, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(project_id, field_id) DO UPDATE SET
    name = excluded.name,
    field_type = excluded.field_type,
    options = excluded.options,
    updated_at = excluded.updated_at
"#,
                    params![
                        project_id,
                        field.field_id,
                        field.name,
                        field.kind.type_tag(),
                        field.kind.options_json(),
                        now
                    ],
                )?;
            }

            let fetched: Vec<&str> = catalog.iter().map(|f| f.field_id.as_str()).collect();
            for field_id in known {
                if !fetched.contains(&field_id.as_str()) {
                    tx.execute(
                        "DELETE FROM project_field WHERE project_id = ?1 AND field_id = ?2",
                        params![project_id, field_id],
                    )?;
                }
            }
        }

        // Rebuild the iteration cache wholesale.
        tx.execute(
            "DELETE FROM iteration_option WHERE project_id = ?1",
            params![project_id],
        )?;
        if let Some(field) = fields::iteration_field(catalog) {
            for option in fields::iteration_options(field) {
                tx.execute(
                    r#"
INSERT INTO iteration_option (project_id, option_id, title, start_date, end_date)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
                    params![
                        project_id,
                        option.id,
                        option.title,
                        option.start_date.map(|d| d.to_rfc3339()),
                        option.end_date.map(|d| d.to_rfc3339())
                    ],
                )?;
            }
        }

        // Single-select-derived epic rows (option_id set) mirror the remote
        // option list; label-scheme rows (option_id null) are managed by the
        // option manager and survive refreshes.
        tx.execute(
            "DELETE FROM epic_option WHERE project_id = ?1 AND option_id IS NOT NULL",
            params![project_id],
        )?;
        if let Some(field) = fields::epic_field(catalog) {
            for option in fields::epic_options(field) {
                tx.execute(
                    r#"
INSERT INTO epic_option (project_id, option_id, name, color, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
                    params![project_id, option.id, option.name, option.color, now],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub async fn load_fields(&self, project_id: i64) -> Result<Vec<ProjectField>, SyncError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT field_id, name, field_type, options FROM project_field WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            let field_id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let field_type: String = row.get(2)?;
            let options: Option<String> = row.get(3)?;
            Ok(ProjectField {
                field_id,
                name,
                kind: FieldKind::from_cache(&field_type, options.as_deref()),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn iteration_options(
        &self,
        project_id: i64,
    ) -> Result<Vec<IterationOption>, SyncError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT option_id, title, start_date, end_date FROM iteration_option WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            let start: Option<String> = row.get(2)?;
            let end: Option<String> = row.get(3)?;
            Ok(IterationOption {
                id: row.get(0)?,
                title: row.get(1)?,
                start_date: start.as_deref().and_then(parse_rfc3339),
                end_date: end.as_deref().and_then(parse_rfc3339),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn epic_options(&self, project_id: i64) -> Result<Vec<EpicOptionRecord>, SyncError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, option_id, name, label_name, color, description FROM epic_option WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![project_id], map_epic_option)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn epic_option_by_id(&self, id: i64) -> Result<Option<EpicOptionRecord>, SyncError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, project_id, option_id, name, label_name, color, description FROM epic_option WHERE id = ?1",
            params![id],
            map_epic_option,
        )
        .optional()
        .map_err(SyncError::from)
    }

    pub async fn insert_epic_label(
        &self,
        project_id: i64,
        name: &str,
        label_name: &str,
        color: Option<&str>,
        description: Option<&str>,
    ) -> Result<EpicOptionRecord, SyncError> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
INSERT INTO epic_option (project_id, name, label_name, color, description, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
            params![project_id, name, label_name, color, description, now_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, project_id, option_id, name, label_name, color, description FROM epic_option WHERE id = ?1",
            params![id],
            map_epic_option,
        )
        .map_err(SyncError::from)
    }

    pub async fn update_epic_label(
        &self,
        id: i64,
        name: Option<&str>,
        color: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
UPDATE epic_option SET
    name = COALESCE(?1, name),
    color = COALESCE(?2, color),
    description = COALESCE(?3, description),
    updated_at = ?4
WHERE id = ?5
"#,
            params![name, color, description, now_rfc3339(), id],
        )?;
        Ok(())
    }

    pub async fn delete_epic_option_row(&self, id: i64) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM epic_option WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Upserts one fetched item by its immutable node id and stamps the
    /// local sync time. Local-edit provenance is left untouched.
    pub async fn upsert_item(
        &self,
        project_id: i64,
        payload: &ItemPayload,
        synced_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
INSERT INTO project_item (
    project_id, node_id, content_node_id, content_type, title, url, status,
    assignees, iteration, iteration_id, iteration_start, iteration_end,
    estimate, start_date, end_date, due_date, epic_option_id, epic_name,
    field_values, updated_at, remote_updated_at, last_synced_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
ON CONFLICT(node_id) DO UPDATE SET
    project_id = excluded.project_id,
    content_node_id = excluded.content_node_id,
    content_type = excluded.content_type,
    title = excluded.title,
    url = excluded.url,
    status = excluded.status,
    assignees = excluded.assignees,
    iteration = excluded.iteration,
    iteration_id = excluded.iteration_id,
    iteration_start = excluded.iteration_start,
    iteration_end = excluded.iteration_end,
    estimate = excluded.estimate,
    start_date = excluded.start_date,
    end_date = excluded.end_date,
    due_date = excluded.due_date,
    epic_option_id = excluded.epic_option_id,
    epic_name = excluded.epic_name,
    field_values = excluded.field_values,
    updated_at = excluded.updated_at,
    remote_updated_at = excluded.remote_updated_at,
    last_synced_at = excluded.last_synced_at
"#,
            params![
                project_id,
                payload.node_id,
                payload.content_node_id,
                payload.content_type,
                payload.title,
                payload.url,
                payload.status,
                json_string(&payload.assignees),
                payload.iteration,
                payload.iteration_id,
                payload.iteration_start.map(|d| d.to_rfc3339()),
                payload.iteration_end.map(|d| d.to_rfc3339()),
                payload.estimate,
                payload.start_date.map(|d| d.to_rfc3339()),
                payload.end_date.map(|d| d.to_rfc3339()),
                payload.due_date.map(|d| d.to_rfc3339()),
                payload.epic_option_id,
                payload.epic_name,
                json_string(&payload.field_values),
                payload.updated_at.map(|d| d.to_rfc3339()),
                payload.remote_updated_at.map(|d| d.to_rfc3339()),
                synced_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub async fn item_by_node_id(&self, node_id: &str) -> Result<Option<ProjectItem>, SyncError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("{ITEM_SELECT} WHERE node_id = ?1"),
            params![node_id],
            map_item,
        )
        .optional()
        .map_err(SyncError::from)
    }

    pub async fn items_by_content_node_id(
        &self,
        content_node_id: &str,
    ) -> Result<Vec<ProjectItem>, SyncError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("{ITEM_SELECT} WHERE content_node_id = ?1"))?;
        let rows = stmt.query_map(params![content_node_id], map_item)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn list_items(&self, project_id: i64) -> Result<Vec<ProjectItem>, SyncError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare(&format!("{ITEM_SELECT} WHERE project_id = ?1 ORDER BY id ASC"))?;
        let rows = stmt.query_map(params![project_id], map_item)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Writes back every mutable attribute of one item, keyed by node id.
    pub async fn save_item(&self, item: &ProjectItem) -> Result<(), SyncError> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
UPDATE project_item SET
    status = ?1,
    iteration = ?2,
    iteration_id = ?3,
    iteration_start = ?4,
    iteration_end = ?5,
    start_date = ?6,
    end_date = ?7,
    due_date = ?8,
    epic_option_id = ?9,
    epic_name = ?10,
    last_local_edit_at = ?11,
    last_local_edit_by = ?12
WHERE node_id = ?13
"#,
            params![
                item.status,
                item.iteration,
                item.iteration_id,
                item.iteration_start.map(|d| d.to_rfc3339()),
                item.iteration_end.map(|d| d.to_rfc3339()),
                item.start_date.map(|d| d.to_rfc3339()),
                item.end_date.map(|d| d.to_rfc3339()),
                item.due_date.map(|d| d.to_rfc3339()),
                item.epic_option_id,
                item.epic_name,
                item.last_local_edit_at.map(|d| d.to_rfc3339()),
                item.last_local_edit_by,
                item.node_id
            ],
        )?;
        Ok(())
    }

    pub async fn delete_item_by_node_id(&self, node_id: &str) -> Result<bool, SyncError> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM project_item WHERE node_id = ?1",
            params![node_id],
        )?;
        Ok(deleted > 0)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;
        if already_applied.is_some() {
            continue;
        }
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_rfc3339()],
        )?;
    }

    tx.commit()
}

const PROJECT_SELECT: &str = "SELECT id, tenant, owner_login, project_number, node_id, name, status_columns, last_synced_at FROM project";

const ITEM_SELECT: &str = "SELECT id, project_id, node_id, content_node_id, content_type, title, url, status, assignees, iteration, iteration_id, iteration_start, iteration_end, estimate, start_date, end_date, due_date, epic_option_id, epic_name, field_values, updated_at, remote_updated_at, last_synced_at, last_local_edit_at, last_local_edit_by FROM project_item";

fn project_row(conn: &Connection, id: i64) -> Result<Project, SyncError> {
    conn.query_row(
        &format!("{PROJECT_SELECT} WHERE id = ?1"),
        params![id],
        map_project,
    )
    .map_err(SyncError::from)
}

fn map_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    let status_columns: Option<String> = row.get(6)?;
    let last_synced_at: Option<String> = row.get(7)?;
    Ok(Project {
        id: row.get(0)?,
        tenant: row.get(1)?,
        owner_login: row.get(2)?,
        project_number: row.get(3)?,
        node_id: row.get(4)?,
        name: row.get(5)?,
        status_columns: status_columns.and_then(|raw| serde_json::from_str(&raw).ok()),
        last_synced_at: last_synced_at.as_deref().and_then(parse_rfc3339),
    })
}

fn map_epic_option(row: &Row<'_>) -> rusqlite::Result<EpicOptionRecord> {
    Ok(EpicOptionRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        option_id: row.get(2)?,
        name: row.get(3)?,
        label_name: row.get(4)?,
        color: row.get(5)?,
        description: row.get(6)?,
    })
}

fn map_item(row: &Row<'_>) -> rusqlite::Result<ProjectItem> {
    let assignees: Option<String> = row.get(8)?;
    let field_values: Option<String> = row.get(19)?;
    let get_dt = |idx: usize| -> rusqlite::Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = row.get(idx)?;
        Ok(raw.as_deref().and_then(parse_rfc3339))
    };
    Ok(ProjectItem {
        id: row.get(0)?,
        project_id: row.get(1)?,
        node_id: row.get(2)?,
        content_node_id: row.get(3)?,
        content_type: row.get(4)?,
        title: row.get(5)?,
        url: row.get(6)?,
        status: row.get(7)?,
        assignees: assignees
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        iteration: row.get(9)?,
        iteration_id: row.get(10)?,
        iteration_start: get_dt(11)?,
        iteration_end: get_dt(12)?,
        estimate: row.get(13)?,
        start_date: get_dt(14)?,
        end_date: get_dt(15)?,
        due_date: get_dt(16)?,
        epic_option_id: row.get(17)?,
        epic_name: row.get(18)?,
        field_values: field_values
            .and_then(|raw| serde_json::from_str::<BTreeMap<String, Value>>(&raw).ok())
            .unwrap_or_default(),
        updated_at: get_dt(20)?,
        remote_updated_at: get_dt(21)?,
        last_synced_at: get_dt(22)?,
        last_local_edit_at: get_dt(23)?,
        last_local_edit_by: row.get(24)?,
    })
}

fn json_string<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldKind, SelectOption};

    fn select_field(field_id: &str, name: &str, options: Vec<SelectOption>) -> ProjectField {
        ProjectField {
            field_id: field_id.to_string(),
            name: name.to_string(),
            kind: FieldKind::SingleSelect { options },
        }
    }

    fn option(id: &str, name: &str) -> SelectOption {
        SelectOption {
            id: id.to_string(),
            name: name.to_string(),
            color: None,
        }
    }

    async fn project(store: &Store) -> Project {
        store
            .upsert_project("acme", "acme-org", 7, "proj-node-1", Some("Roadmap"), None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn project_upsert_is_keyed_by_tenant_owner_number() {
        let store = Store::open_in_memory().unwrap();
        let first = project(&store).await;
        let second = store
            .upsert_project("acme", "acme-org", 7, "proj-node-1", Some("Renamed"), None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Renamed"));
        assert_eq!(store.list_projects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_columns_initialize_once() {
        let store = Store::open_in_memory().unwrap();
        let columns = vec!["Backlog".to_string(), "Done".to_string()];
        let created = store
            .upsert_project("acme", "acme-org", 7, "n-1", None, Some(&columns))
            .await
            .unwrap();
        assert_eq!(created.status_columns.as_deref(), Some(&columns[..]));

        let changed = vec!["Other".to_string()];
        let updated = store
            .upsert_project("acme", "acme-org", 7, "n-1", None, Some(&changed))
            .await
            .unwrap();
        // Existing list wins; the cache is only seeded when unset.
        assert_eq!(updated.status_columns.as_deref(), Some(&columns[..]));
    }

    #[tokio::test]
    async fn field_refresh_deletes_rows_missing_from_the_fetch() {
        let store = Store::open_in_memory().unwrap();
        let project = project(&store).await;

        let first = vec![
            select_field("f-1", "Status", vec![option("o-1", "Backlog")]),
            select_field("f-2", "Epic", vec![option("o-2", "Payments")]),
        ];
        store.replace_fields(project.id, &first).await.unwrap();
        assert_eq!(store.load_fields(project.id).await.unwrap().len(), 2);

        let second = vec![select_field("f-1", "Status", vec![option("o-1", "Backlog")])];
        store.replace_fields(project.id, &second).await.unwrap();
        let remaining = store.load_fields(project.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].field_id, "f-1");
    }

    #[tokio::test]
    async fn epic_cache_rebuilds_but_label_rows_survive() {
        let store = Store::open_in_memory().unwrap();
        let project = project(&store).await;

        store
            .insert_epic_label(project.id, "Setup", "epic:setup", Some("00ff00"), None)
            .await
            .unwrap();

        let catalog = vec![select_field("f-2", "Epic", vec![option("o-2", "Payments")])];
        store.replace_fields(project.id, &catalog).await.unwrap();

        let options = store.epic_options(project.id).await.unwrap();
        assert_eq!(options.len(), 2);
        assert!(options.iter().any(|o| o.label_name.as_deref() == Some("epic:setup")));
        assert!(options.iter().any(|o| o.option_id.as_deref() == Some("o-2")));

        // A refresh without the epic field drops only the derived rows.
        store.replace_fields(project.id, &[]).await.unwrap();
        let options = store.epic_options(project.id).await.unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label_name.as_deref(), Some("epic:setup"));
    }

    #[tokio::test]
    async fn iteration_cache_resolves_date_ranges() {
        let store = Store::open_in_memory().unwrap();
        let project = project(&store).await;
        let catalog = vec![ProjectField {
            field_id: "f-it".into(),
            name: "Iteration".into(),
            kind: FieldKind::Iteration {
                iterations: vec![crate::fields::IterationEntry {
                    id: "it-1".into(),
                    title: "Sprint 1".into(),
                    start_date: Some("2025-01-01".into()),
                    duration: Some(14),
                }],
            },
        }];
        store.replace_fields(project.id, &catalog).await.unwrap();

        let options = store.iteration_options(project.id).await.unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].title, "Sprint 1");
        assert_eq!(
            options[0].end_date.unwrap().to_rfc3339(),
            "2025-01-15T00:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn item_upsert_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let project = project(&store).await;
        let payload = ItemPayload {
            node_id: "item-1".into(),
            title: Some("Fix login".into()),
            status: Some("Backlog".into()),
            assignees: vec!["alice".into()],
            ..Default::default()
        };

        let at = Utc::now();
        store.upsert_item(project.id, &payload, at).await.unwrap();
        store.upsert_item(project.id, &payload, at).await.unwrap();

        let items = store.list_items(project.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Fix login"));
        assert_eq!(items[0].assignees, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn stale_items_are_kept_after_a_refetch_without_them() {
        let store = Store::open_in_memory().unwrap();
        let project = project(&store).await;
        let first = ItemPayload {
            node_id: "item-1".into(),
            ..Default::default()
        };
        let second = ItemPayload {
            node_id: "item-2".into(),
            ..Default::default()
        };
        store.upsert_item(project.id, &first, Utc::now()).await.unwrap();
        store.upsert_item(project.id, &second, Utc::now()).await.unwrap();

        // A later fetch returning only item-2 must not delete item-1; the
        // mirror is additive until a pruning pass exists.
        store.upsert_item(project.id, &second, Utc::now()).await.unwrap();
        assert_eq!(store.list_items(project.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn save_item_round_trips_local_edits() {
        let store = Store::open_in_memory().unwrap();
        let project = project(&store).await;
        let payload = ItemPayload {
            node_id: "item-1".into(),
            status: Some("Backlog".into()),
            ..Default::default()
        };
        store.upsert_item(project.id, &payload, Utc::now()).await.unwrap();

        let mut item = store.item_by_node_id("item-1").await.unwrap().unwrap();
        item.status = Some("Done".into());
        item.last_local_edit_at = Some(Utc::now());
        item.last_local_edit_by = Some("user-9".into());
        store.save_item(&item).await.unwrap();

        let reloaded = store.item_by_node_id("item-1").await.unwrap().unwrap();
        assert_eq!(reloaded.status.as_deref(), Some("Done"));
        assert_eq!(reloaded.last_local_edit_by.as_deref(), Some("user-9"));
        assert!(reloaded.last_local_edit_at.is_some());
    }

    #[tokio::test]
    async fn reopening_a_database_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boardsync.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .upsert_project("acme", "acme-org", 7, "n-1", Some("Roadmap"), None)
                .await
                .unwrap();
        }
        // Migrations are recorded, so a reopen applies nothing new.
        let store = Store::open(&path).unwrap();
        let projects = store.list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name.as_deref(), Some("Roadmap"));
    }

    #[tokio::test]
    async fn delete_item_reports_whether_a_row_went_away() {
        let store = Store::open_in_memory().unwrap();
        let project = project(&store).await;
        let payload = ItemPayload {
            node_id: "item-1".into(),
            ..Default::default()
        };
        store.upsert_item(project.id, &payload, Utc::now()).await.unwrap();

        assert!(store.delete_item_by_node_id("item-1").await.unwrap());
        assert!(!store.delete_item_by_node_id("item-1").await.unwrap());
    }
}
