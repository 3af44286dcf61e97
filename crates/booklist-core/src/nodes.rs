//! Expand/collapse state of a built list.
//!
//! A node is either collapsed (visible, descendants hidden) or expanded
//! (visible, descendants shown down to the next collapsed node). Positions
//! here are absolute: navigation row id minus one.
//!
//! Only the state of level-1 nodes is persisted, as `(outer kind, root key)`
//! rows in the node settings table.

use crate::database::Result;
use crate::list::{navigation_id, BuiltList};
use crate::row::BookPosition;
use crate::schema::NODE_SETTINGS_TABLE;
use rusqlite::{params, Connection, OptionalExtension};

impl BuiltList {
    /// Flip the node at `absolute_position` and apply the new state to its
    /// subtree. Returns the new expanded state, or `None` when there is no
    /// visible row at that position.
    pub fn toggle_node(&self, absolute_position: i64) -> Result<Option<bool>> {
        let Some(node_id) = navigation_id(absolute_position) else {
            return Ok(None);
        };
        let nav = self.tables.navigation();
        let toggled = self.db.transaction(|tx| {
            let node: Option<(i64, bool, Option<String>)> = tx
                .query_row(
                    &format!(
                        "SELECT level, expanded, root_key FROM {nav} WHERE id = ?1 AND visible = 1"
                    ),
                    [node_id],
                    |r| Ok((r.get(0)?, r.get::<_, i64>(1)? != 0, r.get(2)?)),
                )
                .optional()?;
            // A hidden node would open a subtree under a collapsed ancestor.
            let Some((level, expanded, root_key)) = node else {
                return Ok(None);
            };
            let expanded = !expanded;

            tx.execute(
                &format!("UPDATE {nav} SET expanded = ?1 WHERE id = ?2"),
                params![expanded, node_id],
            )?;
            let end = self.subtree_end(tx, node_id, level)?;
            tx.execute(
                &format!(
                    "UPDATE {nav} SET visible = ?1, expanded = ?1 WHERE id > ?2 AND id < ?3 AND level > ?4"
                ),
                params![expanded, node_id, end, level],
            )?;
            if let Some(root_key) = root_key {
                self.persist_root(tx, &root_key)?;
            }
            Ok(Some(expanded))
        })?;
        if toggled.is_some() {
            self.bump_generation();
        }
        Ok(toggled)
    }

    /// Expand or collapse every node. Expanding records every top-level node
    /// in the node settings; collapsing forgets them all.
    pub fn expand_all(&self, expand: bool) -> Result<()> {
        let nav = self.tables.navigation();
        self.db.transaction(|tx| {
            if expand {
                tx.execute(&format!("UPDATE {nav} SET expanded = 1, visible = 1"), [])?;
            } else {
                tx.execute(
                    &format!(
                        "UPDATE {nav} SET expanded = 0, visible = CASE WHEN level = 1 THEN 1 ELSE 0 END"
                    ),
                    [],
                )?;
            }
            self.replace_settings(tx)
        })?;
        self.bump_generation();
        Ok(())
    }

    /// Make the row at `absolute_position` visible by opening the subtree of
    /// its level-1 ancestor. Nodes that are already open stay open. Returns
    /// whether anything changed.
    pub fn ensure_visible(&self, absolute_position: i64) -> Result<bool> {
        let Some(target_id) = navigation_id(absolute_position) else {
            return Ok(false);
        };
        let nav = self.tables.navigation();
        let changed = self.db.transaction(|tx| {
            let visible: Option<i64> = tx
                .query_row(
                    &format!("SELECT visible FROM {nav} WHERE id = ?1"),
                    [target_id],
                    |r| r.get(0),
                )
                .optional()?;
            match visible {
                None | Some(1) => return Ok(false),
                Some(_) => {}
            }

            let root: Option<(i64, Option<String>)> = tx
                .query_row(
                    &format!(
                        "SELECT id, root_key FROM {nav} WHERE id <= ?1 AND level = 1 ORDER BY id DESC LIMIT 1"
                    ),
                    [target_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let Some((root_id, root_key)) = root else {
                return Ok(false);
            };

            let end = self.subtree_end(tx, root_id, 1)?;
            tx.execute(&format!("UPDATE {nav} SET expanded = 1 WHERE id = ?1"), [root_id])?;
            tx.execute(
                &format!("UPDATE {nav} SET visible = 1, expanded = 1 WHERE id > ?1 AND id < ?2"),
                [root_id, end],
            )?;
            if let Some(root_key) = root_key {
                self.persist_root(tx, &root_key)?;
            }
            Ok(true)
        })?;
        if changed {
            self.bump_generation();
        }
        Ok(changed)
    }

    /// Replace the node settings of this list's outer kind with the current
    /// set of expanded level-1 nodes.
    pub fn save_node_settings(&self) -> Result<()> {
        self.db.transaction(|tx| self.replace_settings(tx))
    }

    /// Visible position of the row at `absolute_position`, or `None` when the
    /// row is hidden or does not exist.
    pub fn visible_position_of(&self, absolute_position: i64) -> Result<Option<i64>> {
        let Some(id) = navigation_id(absolute_position) else {
            return Ok(None);
        };
        let nav = self.tables.navigation();
        self.db.read(|conn| {
            let visible: Option<i64> = conn
                .query_row(&format!("SELECT visible FROM {nav} WHERE id = ?1"), [id], |r| r.get(0))
                .optional()?;
            if visible != Some(1) {
                return Ok(None);
            }
            let before: i64 = conn.query_row(
                &format!("SELECT count(*) FROM {nav} WHERE visible = 1 AND id < ?1"),
                [id],
                |r| r.get(0),
            )?;
            Ok(Some(before))
        })
    }

    /// Every leaf occurrence of a book, in list order.
    pub fn book_positions(&self, book_id: i64) -> Result<Vec<BookPosition>> {
        let sql = format!(
            "SELECT n.id - 1, n.visible, n.root_key\n\
             FROM {list} l JOIN {nav} n ON n.list_id = l.id\n\
             WHERE l.level = ?1 AND l.book = ?2\n\
             ORDER BY n.id",
            list = self.tables.list(),
            nav = self.tables.navigation(),
        );
        self.db.read(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let positions = stmt
                .query_map([self.leaf_level, book_id], |r| {
                    Ok(BookPosition {
                        absolute_position: r.get(0)?,
                        visible: r.get::<_, i64>(1)? != 0,
                        root_key: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(positions)
        })
    }

    /// Id of the first row after `node_id` that is not inside its subtree.
    fn subtree_end(&self, conn: &Connection, node_id: i64, level: i64) -> Result<i64> {
        let end: Option<i64> = conn.query_row(
            &format!(
                "SELECT min(id) FROM {} WHERE id > ?1 AND level <= ?2",
                self.tables.navigation()
            ),
            [node_id, level],
            |r| r.get(0),
        )?;
        Ok(end.unwrap_or(i64::MAX))
    }

    /// Store or forget a top-level node according to its current state.
    fn persist_root(&self, conn: &Connection, root_key: &str) -> Result<()> {
        let kind = self.outer_kind;
        conn.execute(
            &format!("DELETE FROM {NODE_SETTINGS_TABLE} WHERE kind = ?1 AND root_key = ?2"),
            params![kind, root_key],
        )?;
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {NODE_SETTINGS_TABLE} (kind, root_key)\n\
                 SELECT ?1, root_key FROM {} WHERE level = 1 AND root_key = ?2 AND expanded = 1",
                self.tables.navigation()
            ),
            params![kind, root_key],
        )?;
        Ok(())
    }

    fn replace_settings(&self, conn: &Connection) -> Result<()> {
        let kind = self.outer_kind;
        conn.execute(
            &format!("DELETE FROM {NODE_SETTINGS_TABLE} WHERE kind = ?1"),
            [kind],
        )?;
        let saved = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {NODE_SETTINGS_TABLE} (kind, root_key)\n\
                 SELECT DISTINCT ?1, root_key FROM {} WHERE level = 1 AND expanded = 1 AND root_key IS NOT NULL",
                self.tables.navigation()
            ),
            [kind],
        )?;
        log::trace!("saved {saved} expanded nodes for {kind:?}");
        Ok(())
    }
}
