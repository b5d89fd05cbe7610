//! SQLite implementation of [`ProjectStore`].
//!
//! [`SqliteStore`] keeps projects in a SQLite database with WAL mode,
//! a transaction around every multi-row write, and automatic schema
//! migrations. Ids are stored as TEXT; node position and size as JSON TEXT.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use notetree_core::{ChatEdge, ChatNode, EdgeId, GraphSnapshot, NodeId, NodeKind, UiFlags};

use crate::error::StorageError;
use crate::traits::ProjectStore;
use crate::types::{bump, now_millis, Project, ProjectId, ProjectUpdate};

/// SQLite-backed implementation of [`ProjectStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    fn assert_project_exists(conn: &Connection, id: ProjectId) -> Result<(), StorageError> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::ProjectNotFound(id));
        }
        Ok(())
    }

    fn touch(tx: &Transaction<'_>, id: ProjectId) -> Result<(), StorageError> {
        let previous: i64 = tx.query_row(
            "SELECT last_modified FROM projects WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE projects SET last_modified = ?1 WHERE id = ?2",
            params![bump(previous), id.to_string()],
        )?;
        Ok(())
    }

    fn write_nodes(
        tx: &Transaction<'_>,
        project: ProjectId,
        nodes: &[ChatNode],
    ) -> Result<(), StorageError> {
        tx.execute(
            "DELETE FROM nodes WHERE project_id = ?1",
            params![project.to_string()],
        )?;
        let mut stmt = tx.prepare_cached(
            "INSERT INTO nodes (id, project_id, kind, text, is_generating, created_at, position, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for node in nodes {
            stmt.execute(params![
                node.id.to_string(),
                project.to_string(),
                node.kind.as_str(),
                node.text,
                node.is_generating,
                node.created_at,
                serde_json::to_string(&node.position)?,
                serde_json::to_string(&node.size)?,
            ])?;
        }
        Ok(())
    }

    fn write_edges(
        tx: &Transaction<'_>,
        project: ProjectId,
        edges: &[ChatEdge],
    ) -> Result<(), StorageError> {
        tx.execute(
            "DELETE FROM edges WHERE project_id = ?1",
            params![project.to_string()],
        )?;
        let mut stmt = tx.prepare_cached(
            "INSERT INTO edges (id, project_id, source_id, target_id) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for edge in edges {
            stmt.execute(params![
                edge.id.to_string(),
                project.to_string(),
                edge.source_id.to_string(),
                edge.target_id.to_string(),
            ])?;
        }
        Ok(())
    }

    fn read_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, Project)> {
        Ok((
            row.get(0)?,
            Project {
                id: ProjectId(Uuid::nil()),
                name: row.get(1)?,
                system_prompt: row.get(2)?,
                model: row.get(3)?,
                created_at: row.get(4)?,
                last_modified: row.get(5)?,
            },
        ))
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|e| StorageError::IntegrityError {
        reason: format!("invalid id '{}': {}", raw, e),
    })
}

fn with_id((raw, mut project): (String, Project)) -> Result<Project, StorageError> {
    project.id = ProjectId(parse_uuid(&raw)?);
    Ok(project)
}

impl ProjectStore for SqliteStore {
    fn create_project(
        &mut self,
        name: &str,
        system_prompt: &str,
        model: &str,
    ) -> Result<Project, StorageError> {
        let now = now_millis();
        let project = Project {
            id: ProjectId::new(),
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
            model: model.to_string(),
            created_at: now,
            last_modified: now,
        };
        self.conn.execute(
            "INSERT INTO projects (id, name, system_prompt, model, created_at, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project.id.to_string(),
                project.name,
                project.system_prompt,
                project.model,
                project.created_at,
                project.last_modified,
            ],
        )?;
        Ok(project)
    }

    fn get_project(&self, id: ProjectId) -> Result<Project, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, system_prompt, model, created_at, last_modified
                 FROM projects WHERE id = ?1",
                params![id.to_string()],
                Self::read_project,
            )
            .optional()?
            .ok_or(StorageError::ProjectNotFound(id))?;
        with_id(row)
    }

    fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, system_prompt, model, created_at, last_modified
             FROM projects ORDER BY last_modified DESC, created_at DESC, id ASC",
        )?;
        let rows = stmt
            .query_map([], Self::read_project)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(with_id).collect()
    }

    fn update_project(
        &mut self,
        id: ProjectId,
        update: &ProjectUpdate,
    ) -> Result<Project, StorageError> {
        let mut project = self.get_project(id)?;
        if let Some(name) = &update.name {
            project.name = name.clone();
        }
        if let Some(prompt) = &update.system_prompt {
            project.system_prompt = prompt.clone();
        }
        if let Some(model) = &update.model {
            project.model = model.clone();
        }
        project.last_modified = bump(project.last_modified);

        self.conn.execute(
            "UPDATE projects SET name = ?1, system_prompt = ?2, model = ?3, last_modified = ?4
             WHERE id = ?5",
            params![
                project.name,
                project.system_prompt,
                project.model,
                project.last_modified,
                id.to_string(),
            ],
        )?;
        Ok(project)
    }

    fn delete_project(&mut self, id: ProjectId) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        Self::assert_project_exists(&tx, id)?;
        // The cascade would cover these, explicit deletes keep the order obvious.
        tx.execute("DELETE FROM edges WHERE project_id = ?1", params![id.to_string()])?;
        tx.execute("DELETE FROM nodes WHERE project_id = ?1", params![id.to_string()])?;
        tx.execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(())
    }

    fn replace_nodes(&mut self, project: ProjectId, nodes: &[ChatNode]) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        Self::assert_project_exists(&tx, project)?;
        Self::write_nodes(&tx, project, nodes)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_edges(&mut self, project: ProjectId, edges: &[ChatEdge]) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        Self::assert_project_exists(&tx, project)?;
        Self::write_edges(&tx, project, edges)?;
        tx.commit()?;
        Ok(())
    }

    fn save_graph(&mut self, project: ProjectId, graph: &GraphSnapshot) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        Self::assert_project_exists(&tx, project)?;
        Self::write_nodes(&tx, project, &graph.nodes)?;
        Self::write_edges(&tx, project, &graph.edges)?;
        Self::touch(&tx, project)?;
        tx.commit()?;
        Ok(())
    }

    fn update_node_text(
        &mut self,
        project: ProjectId,
        node: NodeId,
        text: &str,
    ) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE nodes SET text = ?1 WHERE id = ?2 AND project_id = ?3",
            params![text, node.to_string(), project.to_string()],
        )?;
        if changed == 0 {
            Self::assert_project_exists(&self.conn, project)?;
            return Err(StorageError::NodeNotFound { project, node });
        }
        Ok(())
    }

    fn load_graph(&self, project: ProjectId) -> Result<GraphSnapshot, StorageError> {
        Self::assert_project_exists(&self.conn, project)?;

        let mut stmt = self.conn.prepare(
            "SELECT id, kind, text, is_generating, created_at, position, size
             FROM nodes WHERE project_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let raw_nodes = stmt
            .query_map(params![project.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut nodes = Vec::with_capacity(raw_nodes.len());
        for (id, kind, text, is_generating, created_at, position, size) in raw_nodes {
            let kind = NodeKind::parse(&kind).ok_or_else(|| StorageError::IntegrityError {
                reason: format!("unknown node kind '{}'", kind),
            })?;
            nodes.push(ChatNode {
                id: NodeId(parse_uuid(&id)?),
                kind,
                text,
                is_generating,
                created_at,
                position: serde_json::from_str(&position)?,
                size: serde_json::from_str(&size)?,
                ui: UiFlags::default(),
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, target_id FROM edges WHERE project_id = ?1 ORDER BY rowid",
        )?;
        let raw_edges = stmt
            .query_map(params![project.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let edges = raw_edges
            .into_iter()
            .map(|(id, source, target)| {
                Ok(ChatEdge {
                    id: EdgeId(parse_uuid(&id)?),
                    source_id: NodeId(parse_uuid(&source)?),
                    target_id: NodeId(parse_uuid(&target)?),
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        Ok(GraphSnapshot { nodes, edges })
    }
}
