use rusqlite::Connection;
use std::borrow::Cow;

pub(crate) const NODE_SETTINGS_TABLE: &str = "book_list_node_settings";

pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        r#"
        -- Record schema read by the list builder
        CREATE TABLE IF NOT EXISTS authors (
          id INTEGER PRIMARY KEY,
          family_name TEXT NOT NULL,
          given_names TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS series (
          id INTEGER PRIMARY KEY,
          series_name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS books (
          id INTEGER PRIMARY KEY,
          book_uuid TEXT NOT NULL UNIQUE,
          title TEXT NOT NULL,
          publisher TEXT,
          genre TEXT,
          language TEXT,
          location TEXT,
          format TEXT,
          date_published TEXT,
          date_added TEXT DEFAULT CURRENT_TIMESTAMP,
          read INTEGER NOT NULL DEFAULT 0,
          read_end TEXT,
          description TEXT,
          notes TEXT,
          isbn TEXT
        );

        CREATE TABLE IF NOT EXISTS book_author (
          book INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
          author INTEGER NOT NULL REFERENCES authors(id),
          author_position INTEGER NOT NULL,
          PRIMARY KEY (book, author)
        );

        CREATE TABLE IF NOT EXISTS book_series (
          book INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
          series INTEGER NOT NULL REFERENCES series(id),
          series_num TEXT,
          series_position INTEGER NOT NULL,
          PRIMARY KEY (book, series)
        );

        CREATE TABLE IF NOT EXISTS bookshelf (
          id INTEGER PRIMARY KEY,
          bookshelf TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS book_bookshelf (
          book INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
          bookshelf INTEGER NOT NULL REFERENCES bookshelf(id),
          PRIMARY KEY (book, bookshelf)
        );

        CREATE TABLE IF NOT EXISTS loan (
          book INTEGER PRIMARY KEY REFERENCES books(id) ON DELETE CASCADE,
          loaned_to TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_book_author_author ON book_author(author);
        CREATE INDEX IF NOT EXISTS idx_book_series_series ON book_series(series);
        CREATE INDEX IF NOT EXISTS idx_book_bookshelf_shelf ON book_bookshelf(bookshelf);

        -- rowid is the book id
        CREATE VIRTUAL TABLE IF NOT EXISTS books_fts USING fts5(
          author, title, description, notes, publisher, genre, location, isbn
        );

        -- Expanded top-level nodes, keyed by the outermost group kind
        CREATE TABLE IF NOT EXISTS book_list_node_settings (
          id INTEGER PRIMARY KEY,
          kind INTEGER NOT NULL,
          root_key TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_node_settings_kind_key
          ON book_list_node_settings(kind, root_key);
        "#,
    )?;

    Ok(())
}

/// Storage class of a derived column in the list table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    /// No declared type. Used for date parts, which hold an integer or the
    /// `UNKNOWN` token and must keep numeric ordering for the integers.
    Any,
}

impl ColumnType {
    fn declaration(self) -> &'static str {
        match self {
            ColumnType::Integer => " INTEGER",
            ColumnType::Real => " REAL",
            ColumnType::Text => " TEXT",
            ColumnType::Any => "",
        }
    }
}

/// A named, typed column of the materialized list table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain {
    name: Cow<'static, str>,
    column_type: ColumnType,
}

impl Domain {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            column_type,
        }
    }

    pub fn named(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            column_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_text(&self) -> bool {
        self.column_type == ColumnType::Text
    }

    pub(crate) fn column_definition(&self) -> String {
        format!("{}{}", self.name, self.column_type.declaration())
    }
}

/// Well-known derived columns.
pub mod domains {
    use super::{ColumnType, Domain};

    pub const BOOK: Domain = Domain::new("book", ColumnType::Integer);
    pub const BOOK_UUID: Domain = Domain::new("book_uuid", ColumnType::Text);
    pub const TITLE: Domain = Domain::new("title", ColumnType::Text);
    pub const READ: Domain = Domain::new("read", ColumnType::Integer);
    pub const SELECTED: Domain = Domain::new("selected", ColumnType::Integer);

    pub const AUTHOR_ID: Domain = Domain::new("author_id", ColumnType::Integer);
    pub const AUTHOR_SORT: Domain = Domain::new("author_sort", ColumnType::Text);
    pub const AUTHOR_FORMATTED: Domain = Domain::new("author_formatted", ColumnType::Text);

    pub const SERIES_ID: Domain = Domain::new("series_id", ColumnType::Integer);
    pub const SERIES_NAME: Domain = Domain::new("series_name", ColumnType::Text);
    pub const SERIES_NUM: Domain = Domain::new("series_num", ColumnType::Real);

    pub const GENRE: Domain = Domain::new("genre", ColumnType::Text);
    pub const PUBLISHER: Domain = Domain::new("publisher", ColumnType::Text);
    pub const LOCATION: Domain = Domain::new("location", ColumnType::Text);
    pub const LANGUAGE: Domain = Domain::new("language", ColumnType::Text);
    pub const FORMAT: Domain = Domain::new("format", ColumnType::Text);
    pub const READ_STATUS: Domain = Domain::new("read_status", ColumnType::Text);
    pub const LOANED_TO: Domain = Domain::new("loaned_to", ColumnType::Text);
    pub const TITLE_LETTER: Domain = Domain::new("title_letter", ColumnType::Text);

    pub const PUBLISHED_YEAR: Domain = Domain::new("published_year", ColumnType::Any);
    pub const PUBLISHED_MONTH: Domain = Domain::new("published_month", ColumnType::Any);
    pub const PUBLISHED_DAY: Domain = Domain::new("published_day", ColumnType::Any);
    pub const ADDED_YEAR: Domain = Domain::new("added_year", ColumnType::Any);
    pub const ADDED_MONTH: Domain = Domain::new("added_month", ColumnType::Any);
    pub const ADDED_DAY: Domain = Domain::new("added_day", ColumnType::Any);
    pub const READ_YEAR: Domain = Domain::new("read_year", ColumnType::Any);
    pub const READ_MONTH: Domain = Domain::new("read_month", ColumnType::Any);
    pub const READ_DAY: Domain = Domain::new("read_day", ColumnType::Any);
}

/// Fixed columns of the list table; extra domains may not reuse these names.
pub(crate) const RESERVED_COLUMNS: &[&str] = &["id", "level", "kind", "book_count", "root_key"];

/// Names of the temporary tables owned by one built list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListTables {
    instance_id: u64,
    list: String,
    navigation: String,
    last_header: String,
}

impl ListTables {
    pub(crate) fn new(instance_id: u64) -> Self {
        Self {
            instance_id,
            list: format!("book_list_{instance_id}"),
            navigation: format!("book_list_nav_{instance_id}"),
            last_header: format!("book_list_hdr_{instance_id}"),
        }
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// The materialized list table (every leaf and summary row).
    pub fn list(&self) -> &str {
        &self.list
    }

    /// The navigation table mapping absolute positions to list rows.
    pub fn navigation(&self) -> &str {
        &self.navigation
    }

    /// Single-row scratch table remembering the group values of the last leaf
    /// inserted (trigger strategy only).
    pub fn last_header(&self) -> &str {
        &self.last_header
    }

    pub(crate) fn create_list_sql(&self, columns: &[&Domain]) -> String {
        let mut sql = format!(
            "CREATE TEMP TABLE {} (\n  id INTEGER PRIMARY KEY,\n  level INTEGER NOT NULL,\n  kind INTEGER NOT NULL,\n  book_count INTEGER NOT NULL DEFAULT 0,\n  root_key TEXT",
            self.list
        );
        for domain in columns {
            sql.push_str(",\n  ");
            sql.push_str(&domain.column_definition());
        }
        sql.push_str("\n)");
        sql
    }

    pub(crate) fn create_navigation_sql(&self) -> String {
        format!(
            "CREATE TEMP TABLE {} (\n  id INTEGER PRIMARY KEY,\n  list_id INTEGER NOT NULL,\n  level INTEGER NOT NULL,\n  root_key TEXT,\n  visible INTEGER NOT NULL DEFAULT 0,\n  expanded INTEGER NOT NULL DEFAULT 0\n)",
            self.navigation
        )
    }

    pub(crate) fn create_last_header_sql(&self, columns: &[&Domain]) -> String {
        let defs: Vec<String> = columns.iter().map(|d| d.column_definition()).collect();
        format!("CREATE TEMP TABLE {} ({})", self.last_header, defs.join(", "))
    }

    pub(crate) fn drop_sql(&self) -> String {
        format!(
            "DROP TABLE IF EXISTS {};\nDROP TABLE IF EXISTS {};\nDROP TABLE IF EXISTS {};",
            self.navigation, self.list, self.last_header
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_tables_are_suffixed_with_instance_id() {
        let tables = ListTables::new(42);
        assert_eq!(tables.list(), "book_list_42");
        assert_eq!(tables.navigation(), "book_list_nav_42");
        assert_eq!(tables.last_header(), "book_list_hdr_42");
    }

    #[test]
    fn date_part_columns_are_untyped() {
        let sql = ListTables::new(1).create_list_sql(&[&domains::ADDED_YEAR, &domains::TITLE]);
        assert!(sql.contains("  added_year,\n"));
        assert!(sql.contains("title TEXT"));
    }

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init(&conn).expect("first init");
        init(&conn).expect("second init");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE name = ?1",
                [NODE_SETTINGS_TABLE],
                |r| r.get(0),
            )
            .expect("query");
        assert_eq!(count, 1);
    }
}
