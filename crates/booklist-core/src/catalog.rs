//! Writes to the record tables the list builder reads from.

use crate::database::{Database, Result};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesEntry {
    pub series_id: i64,
    /// Free text, e.g. `"3"` or `"2.5"`; sorted numerically.
    pub number: Option<String>,
}

/// A book to add, with its authors and series in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub authors: Vec<i64>,
    pub series: Vec<SeriesEntry>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub language: Option<String>,
    pub location: Option<String>,
    pub format: Option<String>,
    /// Partial dates such as `2013` or `2013-5` are accepted.
    pub date_published: Option<String>,
    /// Defaults to the current timestamp.
    pub date_added: Option<String>,
    pub read: bool,
    pub read_end: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub isbn: Option<String>,
}

impl NewBook {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn by(mut self, author_id: i64) -> Self {
        self.authors.push(author_id);
        self
    }

    pub fn in_series(mut self, series_id: i64, number: Option<&str>) -> Self {
        self.series.push(SeriesEntry {
            series_id,
            number: number.map(str::to_string),
        });
        self
    }
}

impl Database {
    pub fn insert_author(&self, family_name: &str, given_names: &str) -> Result<i64> {
        self.write(|conn| {
            conn.execute(
                "INSERT INTO authors (family_name, given_names) VALUES (?1, ?2)",
                params![family_name, given_names],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn insert_series(&self, name: &str) -> Result<i64> {
        self.write(|conn| {
            conn.execute("INSERT INTO series (series_name) VALUES (?1)", [name])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn insert_book(&self, book: &NewBook) -> Result<i64> {
        self.transaction(|tx| insert_book_tx(tx, book))
    }

    /// Insert many books in one transaction. Returns their ids in input order.
    pub fn insert_books(&self, books: &[NewBook]) -> Result<Vec<i64>> {
        self.transaction(|tx| books.iter().map(|book| insert_book_tx(tx, book)).collect())
    }

    pub fn set_read(&self, book_id: i64, read: bool) -> Result<()> {
        self.write(|conn| {
            conn.execute("UPDATE books SET read = ?1 WHERE id = ?2", params![read, book_id])?;
            Ok(())
        })
    }

    /// Id of the named shelf, creating it if needed.
    pub fn create_bookshelf(&self, name: &str) -> Result<i64> {
        self.write(|conn| {
            conn.execute("INSERT OR IGNORE INTO bookshelf (bookshelf) VALUES (?1)", [name])?;
            Ok(conn.query_row("SELECT id FROM bookshelf WHERE bookshelf = ?1", [name], |r| {
                r.get(0)
            })?)
        })
    }

    pub fn add_to_bookshelf(&self, book_id: i64, bookshelf_id: i64) -> Result<()> {
        self.write(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO book_bookshelf (book, bookshelf) VALUES (?1, ?2)",
                [book_id, bookshelf_id],
            )?;
            Ok(())
        })
    }

    /// Record a loan, replacing any current one.
    pub fn lend_book(&self, book_id: i64, loaned_to: &str) -> Result<()> {
        self.write(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO loan (book, loaned_to) VALUES (?1, ?2)",
                params![book_id, loaned_to],
            )?;
            Ok(())
        })
    }

    /// Returns whether the book was on loan.
    pub fn return_book(&self, book_id: i64) -> Result<bool> {
        self.write(|conn| Ok(conn.execute("DELETE FROM loan WHERE book = ?1", [book_id])? > 0))
    }
}

fn insert_book_tx(conn: &Connection, book: &NewBook) -> Result<i64> {
    conn.execute(
        "INSERT INTO books (book_uuid, title, publisher, genre, language, location, format,
                            date_published, date_added, read, read_end, description, notes, isbn)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, coalesce(?9, CURRENT_TIMESTAMP), ?10, ?11, ?12, ?13, ?14)",
        params![
            Uuid::new_v4().to_string(),
            book.title,
            book.publisher,
            book.genre,
            book.language,
            book.location,
            book.format,
            book.date_published,
            book.date_added,
            book.read,
            book.read_end,
            book.description,
            book.notes,
            book.isbn,
        ],
    )?;
    let book_id = conn.last_insert_rowid();

    let mut author_names = Vec::with_capacity(book.authors.len());
    for (position, author_id) in book.authors.iter().enumerate() {
        conn.execute(
            "INSERT INTO book_author (book, author, author_position) VALUES (?1, ?2, ?3)",
            params![book_id, author_id, position as i64 + 1],
        )?;
        let name: Option<String> = conn
            .query_row(
                "SELECT trim(given_names || ' ' || family_name) FROM authors WHERE id = ?1",
                [author_id],
                |r| r.get(0),
            )
            .optional()?;
        author_names.extend(name);
    }

    for (position, entry) in book.series.iter().enumerate() {
        conn.execute(
            "INSERT INTO book_series (book, series, series_num, series_position) VALUES (?1, ?2, ?3, ?4)",
            params![book_id, entry.series_id, entry.number, position as i64 + 1],
        )?;
    }

    conn.execute(
        "INSERT INTO books_fts (rowid, author, title, description, notes, publisher, genre, location, isbn)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            book_id,
            author_names.join(", "),
            book.title,
            book.description,
            book.notes,
            book.publisher,
            book.genre,
            book.location,
            book.isbn,
        ],
    )?;
    Ok(book_id)
}
