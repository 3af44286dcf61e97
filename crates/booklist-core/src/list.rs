use crate::builder::sql::{BuildPlan, CompiledStatements};
use crate::cursor::{BooklistCursor, CursorConfig};
use crate::database::{Database, Result};
use crate::group::GroupKind;
use crate::row::{BooklistRow, RowLayout};
use crate::schema::ListTables;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// The temporary tables of one build, plus the statements that filled them.
///
/// Owned by the caller. Call [`BuiltList::close`] when done: dropping an open
/// list only logs a warning and leaves its tables in the connection.
#[derive(Debug)]
pub struct BuiltList {
    pub(crate) db: Database,
    pub(crate) tables: ListTables,
    statements: CompiledStatements,
    layout: RowLayout,
    pub(crate) outer_kind: GroupKind,
    pub(crate) leaf_level: i64,
    generation: AtomicU64,
    closed: bool,
}

/// Navigation row id of an absolute position. Ids start at 1.
pub(crate) fn navigation_id(absolute_position: i64) -> Option<i64> {
    absolute_position.checked_add(1).filter(|id| *id > 0)
}

impl BuiltList {
    pub(crate) fn new(
        db: Database,
        tables: ListTables,
        statements: CompiledStatements,
        plan: &BuildPlan,
    ) -> Self {
        Self {
            db,
            tables,
            statements,
            layout: plan.layout().clone(),
            outer_kind: plan.outer_kind(),
            leaf_level: plan.leaf_level(),
            generation: AtomicU64::new(0),
            closed: false,
        }
    }

    pub fn tables(&self) -> &ListTables {
        &self.tables
    }

    /// Kind of the outermost group; node settings are stored under it.
    pub fn outer_kind(&self) -> GroupKind {
        self.outer_kind
    }

    pub fn leaf_level(&self) -> i64 {
        self.leaf_level
    }

    /// Changes whenever rows are repopulated or their visibility changes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Rows currently visible.
    pub fn visible_count(&self) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {} WHERE visible = 1", self.tables.navigation());
        self.db.read(|conn| Ok(conn.query_row(&sql, [], |r| r.get(0))?))
    }

    /// Every row, visible or not.
    pub fn total_count(&self) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {}", self.tables.navigation());
        self.db.read(|conn| Ok(conn.query_row(&sql, [], |r| r.get(0))?))
    }

    /// Leaf rows. A book listed under two authors counts twice.
    pub fn book_count(&self) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {} WHERE level = ?1", self.tables.list());
        self.db
            .read(|conn| Ok(conn.query_row(&sql, [self.leaf_level], |r| r.get(0))?))
    }

    pub fn unique_book_count(&self) -> Result<i64> {
        let sql = format!(
            "SELECT count(DISTINCT book) FROM {} WHERE level = ?1",
            self.tables.list()
        );
        self.db
            .read(|conn| Ok(conn.query_row(&sql, [self.leaf_level], |r| r.get(0))?))
    }

    /// Repopulate both tables from current source data with the statements
    /// compiled at build time. Node states are seeded again the same way.
    pub fn rebuild(&self) -> Result<()> {
        let started = Instant::now();
        self.db
            .transaction(|tx| self.statements.repopulate(tx))?;
        self.bump_generation();
        log::debug!("rebuilt {} in {:?}", self.tables.list(), started.elapsed());
        Ok(())
    }

    /// Visible rows `offset..offset + limit`, in display order.
    pub(crate) fn fetch_window(&self, offset: i64, limit: i64) -> Result<Vec<BooklistRow>> {
        let sql = format!(
            "SELECT {}\nFROM {} n JOIN {} l ON l.id = n.list_id\nWHERE n.visible = 1\nORDER BY n.id\nLIMIT ?1 OFFSET ?2",
            self.layout.select_list(),
            self.tables.navigation(),
            self.tables.list(),
        );
        self.db.read(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map([limit, offset], |row| self.layout.read_row(row))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Row at an absolute position regardless of visibility.
    pub fn row_at_absolute(&self, absolute_position: i64) -> Result<Option<BooklistRow>> {
        let Some(id) = navigation_id(absolute_position) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {}\nFROM {} n JOIN {} l ON l.id = n.list_id\nWHERE n.id = ?1",
            self.layout.select_list(),
            self.tables.navigation(),
            self.tables.list(),
        );
        self.db.read(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let mut rows = stmt.query_map([id], |row| self.layout.read_row(row))?;
            Ok(rows.next().transpose()?)
        })
    }

    pub fn cursor(&self) -> BooklistCursor<'_> {
        BooklistCursor::new(self, CursorConfig::default())
    }

    pub fn cursor_with_config(&self, config: CursorConfig) -> BooklistCursor<'_> {
        BooklistCursor::new(self, config)
    }

    /// Drop the temporary tables and release cached statements.
    pub fn close(mut self) -> Result<()> {
        let drop_sql = self.tables.drop_sql();
        self.db.write(|conn| {
            conn.execute_batch(&drop_sql)?;
            conn.flush_prepared_statement_cache();
            Ok(())
        })?;
        self.closed = true;
        log::debug!("closed {}", self.tables.list());
        Ok(())
    }
}

impl Drop for BuiltList {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "book list {} dropped without close(); its temporary tables remain until the connection closes",
                self.tables.list()
            );
        }
    }
}
