use crate::group::GroupKind;
use rusqlite::types::Value;
use std::collections::BTreeMap;

/// One row of a built list, as seen through a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct BooklistRow {
    /// Zero-based position in the full (expanded) hierarchy.
    pub absolute_position: i64,
    pub level: i64,
    pub kind: GroupKind,
    pub visible: bool,
    pub expanded: bool,
    pub root_key: String,
    /// Leaves under this node; 1 for a book row.
    pub book_count: i64,
    /// Display value of the outermost group.
    pub level_1_text: Option<String>,
    /// Display value of the second group, if the style has one.
    pub level_2_text: Option<String>,
    pub book_id: Option<i64>,
    pub book_uuid: Option<String>,
    pub title: Option<String>,
    pub author_id: Option<i64>,
    pub series_id: Option<i64>,
    pub read: bool,
    pub selected: bool,
    /// Caller-requested columns, by domain name.
    pub extras: BTreeMap<String, Value>,
}

impl BooklistRow {
    pub fn is_book(&self) -> bool {
        self.kind == GroupKind::Book
    }

    /// Display text for this row's own level: the title for books, otherwise
    /// the level 1 or level 2 group value.
    pub fn display_text(&self) -> Option<&str> {
        match self.level {
            _ if self.is_book() => self.title.as_deref(),
            1 => self.level_1_text.as_deref(),
            2 => self.level_2_text.as_deref(),
            _ => None,
        }
    }
}

/// Where one occurrence of a book sits in a built list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPosition {
    pub absolute_position: i64,
    pub visible: bool,
    pub root_key: String,
}

/// Which list-table columns back the level texts and extras of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowLayout {
    pub level_1: String,
    pub level_2: Option<String>,
    pub extras: Vec<String>,
}

const FIXED_COLUMNS: &str = "n.id - 1, l.level, l.kind, n.visible, n.expanded, l.root_key, \
     l.book_count, l.book, l.book_uuid, l.title, l.author_id, l.series_id, l.read, l.selected";
const FIXED_COLUMN_COUNT: usize = 14;

impl RowLayout {
    /// Select list matching [`RowLayout::read_row`], over `n` (navigation) and
    /// `l` (list).
    pub fn select_list(&self) -> String {
        let mut sql = String::from(FIXED_COLUMNS);
        sql.push_str(&format!(", l.{}", self.level_1));
        match &self.level_2 {
            Some(column) => sql.push_str(&format!(", l.{column}")),
            None => sql.push_str(", NULL"),
        }
        for extra in &self.extras {
            sql.push_str(&format!(", l.{extra}"));
        }
        sql
    }

    pub fn read_row(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<BooklistRow> {
        let flag = |idx: usize| -> rusqlite::Result<bool> {
            Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0) != 0)
        };
        let mut extras = BTreeMap::new();
        for (offset, name) in self.extras.iter().enumerate() {
            extras.insert(name.clone(), row.get::<_, Value>(FIXED_COLUMN_COUNT + 2 + offset)?);
        }
        Ok(BooklistRow {
            absolute_position: row.get(0)?,
            level: row.get(1)?,
            kind: row.get(2)?,
            visible: flag(3)?,
            expanded: flag(4)?,
            root_key: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            book_count: row.get(6)?,
            book_id: row.get(7)?,
            book_uuid: row.get(8)?,
            title: row.get(9)?,
            author_id: row.get(10)?,
            series_id: row.get(11)?,
            read: flag(12)?,
            selected: flag(13)?,
            level_1_text: display_value(row.get(FIXED_COLUMN_COUNT)?),
            level_2_text: display_value(row.get(FIXED_COLUMN_COUNT + 1)?),
            extras,
        })
    }
}

/// Date-part columns hold integers or the `UNKNOWN` token, so display values
/// are read loosely.
fn display_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(v) => Some(v.to_string()),
        Value::Real(v) => Some(v.to_string()),
        Value::Text(v) => Some(v),
        Value::Blob(v) => Some(String::from_utf8_lossy(&v).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_value_formats_numbers() {
        assert_eq!(display_value(Value::Integer(2013)).as_deref(), Some("2013"));
        assert_eq!(display_value(Value::Null), None);
        assert_eq!(
            display_value(Value::Text("UNKNOWN".to_string())).as_deref(),
            Some("UNKNOWN")
        );
    }

    #[test]
    fn select_list_fills_missing_second_level() {
        let layout = RowLayout {
            level_1: "genre".to_string(),
            level_2: None,
            extras: vec!["isbn".to_string()],
        };
        let sql = layout.select_list();
        assert!(sql.ends_with(", l.genre, NULL, l.isbn"));
    }
}
