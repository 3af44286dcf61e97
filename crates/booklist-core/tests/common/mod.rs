#![allow(dead_code)]

use booklist_core::{
    BooklistBuilder, BooklistRow, BuildRequest, BuiltList, Database, Group, GroupKind, NewBook,
    PreferredState, Style,
};

pub struct Shelf {
    pub db: Database,
    pub adams: i64,
    pub pratchett: i64,
    pub hitchhiker: i64,
    pub guide: i64,
    pub restaurant: i64,
    pub mort: i64,
}

/// Three books: two by Adams in one series (numbers 1 and 2) and one by
/// Pratchett outside any series.
pub fn small_shelf() -> Shelf {
    small_shelf_in(Database::open_in_memory().expect("open db"))
}

pub fn small_shelf_in(db: Database) -> Shelf {
    let adams = db.insert_author("Adams", "Douglas").expect("author");
    let pratchett = db.insert_author("Pratchett", "Terry").expect("author");
    let hitchhiker = db.insert_series("Hitchhiker's Guide").expect("series");

    let mut guide = NewBook::new("The Hitchhiker's Guide to the Galaxy")
        .by(adams)
        .in_series(hitchhiker, Some("1"));
    guide.genre = Some("Science Fiction".to_string());
    guide.date_published = Some("1979-10-12".to_string());
    guide.read = true;

    let mut restaurant = NewBook::new("The Restaurant at the End of the Universe")
        .by(adams)
        .in_series(hitchhiker, Some("2"));
    restaurant.genre = Some("Science Fiction".to_string());
    restaurant.date_published = Some("1980".to_string());
    restaurant.description = Some("Dinner at the end of time".to_string());

    let mut mort = NewBook::new("Mort").by(pratchett);
    mort.genre = Some("Fantasy".to_string());
    mort.date_published = Some("not a date".to_string());

    let ids = db
        .insert_books(&[guide, restaurant, mort])
        .expect("insert books");
    Shelf {
        db,
        adams,
        pratchett,
        hitchhiker,
        guide: ids[0],
        restaurant: ids[1],
        mort: ids[2],
    }
}

/// `count` books spread round-robin over `genres` genres, one author.
pub fn large_shelf(count: usize, genres: usize) -> Database {
    let db = Database::open_in_memory().expect("open db");
    let author = db.insert_author("Writer", "Prolific").expect("author");
    let books: Vec<NewBook> = (0..count)
        .map(|i| {
            let mut book = NewBook::new(format!("Book {i:05}")).by(author);
            book.genre = Some(format!("Genre {}", i % genres));
            book
        })
        .collect();
    db.insert_books(&books).expect("insert books");
    db
}

pub fn style(kinds: &[GroupKind]) -> Style {
    Style::with_groups("test", kinds.iter().copied().map(Group::from_kind)).expect("style")
}

pub fn build(db: &Database, kinds: &[GroupKind], state: PreferredState) -> BuiltList {
    BooklistBuilder::new(db, style(kinds))
        .expect("builder")
        .build(&BuildRequest::with_state(state))
        .expect("build")
}

/// Every row of the list by absolute position, visible or not.
pub fn all_rows(list: &BuiltList) -> Vec<BooklistRow> {
    let total = list.total_count().expect("total");
    (0..total)
        .map(|pos| {
            list.row_at_absolute(pos)
                .expect("row query")
                .expect("row exists")
        })
        .collect()
}

/// Visible rows through a fresh cursor.
pub fn visible_rows(list: &BuiltList) -> Vec<BooklistRow> {
    let cursor = list.cursor();
    let count = cursor.count().expect("count");
    (0..count)
        .map(|pos| cursor.row_at(pos).expect("row exists"))
        .collect()
}

pub fn visible_bitset(list: &BuiltList) -> Vec<bool> {
    all_rows(list).iter().map(|row| row.visible).collect()
}
