mod common;

use booklist_core::{
    domains, BooklistBuilder, BooklistError, BuildRequest, BuildStrategy, BuilderConfig, ColumnType, Database,
    Domain, Group, GroupKind, NewBook, PreferredState, Style,
};
use common::{all_rows, build, small_shelf, style, visible_rows};
use rusqlite::types::Value;

#[test]
fn author_series_hierarchy() {
    let shelf = small_shelf();
    let list = build(
        &shelf.db,
        &[GroupKind::Author, GroupKind::Series],
        PreferredState::AlwaysExpanded,
    );
    let rows = all_rows(&list);

    let shape: Vec<(i64, GroupKind)> = rows.iter().map(|r| (r.level, r.kind)).collect();
    assert_eq!(
        shape,
        vec![
            (1, GroupKind::Author),
            (2, GroupKind::Series),
            (3, GroupKind::Book),
            (3, GroupKind::Book),
            (1, GroupKind::Author),
            (2, GroupKind::Series),
            (3, GroupKind::Book),
        ]
    );

    assert_eq!(rows[0].level_1_text.as_deref(), Some("Adams, Douglas"));
    assert_eq!(rows[0].book_count, 2);
    assert_eq!(rows[1].level_2_text.as_deref(), Some("Hitchhiker's Guide"));
    assert_eq!(rows[1].series_id, Some(shelf.hitchhiker));
    assert_eq!(rows[1].book_count, 2);
    assert_eq!(rows[2].book_id, Some(shelf.guide));
    assert_eq!(rows[3].book_id, Some(shelf.restaurant));
    assert_eq!(rows[4].level_1_text.as_deref(), Some("Pratchett, Terry"));
    assert_eq!(rows[4].book_count, 1);
    assert_eq!(rows[5].level_2_text, None);
    assert_eq!(rows[6].book_id, Some(shelf.mort));
    assert!(rows[6].book_uuid.is_some());
    assert_eq!(rows[6].display_text(), Some("Mort"));

    for (idx, row) in rows.iter().enumerate() {
        assert_eq!(row.absolute_position, idx as i64);
        assert!(row.visible);
    }
    for row in &rows[..4] {
        assert_eq!(row.root_key, format!("a/{}", shelf.adams));
    }
    for row in &rows[4..] {
        assert_eq!(row.root_key, format!("a/{}", shelf.pratchett));
    }

    assert_eq!(list.book_count().expect("book count"), 3);
    assert_eq!(list.unique_book_count().expect("unique"), 3);
    assert_eq!(list.visible_count().expect("visible"), 7);
    list.close().expect("close");
}

/// (level, kind, root key, level 1 text, level 2 text, book id, book count)
type RowShape = (i64, GroupKind, String, Option<String>, Option<String>, Option<i64>, i64);

fn build_with(db: &Database, style: Style, strategy: BuildStrategy) -> Vec<RowShape> {
    let config = BuilderConfig {
        strategy,
        ..BuilderConfig::default()
    };
    let list = BooklistBuilder::with_config(db, style, config)
        .expect("builder")
        .build(&BuildRequest::with_state(PreferredState::AlwaysExpanded))
        .expect("build");
    let shape = all_rows(&list)
        .into_iter()
        .map(|r| {
            (
                r.level,
                r.kind,
                r.root_key,
                r.level_1_text,
                r.level_2_text,
                r.book_id,
                r.book_count,
            )
        })
        .collect();
    list.close().expect("close");
    shape
}

#[test]
fn trigger_and_fallback_strategies_agree() {
    let shelf = small_shelf();
    shelf.db.lend_book(shelf.mort, "Rincewind").expect("lend");
    // Only books on loan are listed under a loaned group.
    let styles = [
        (vec![GroupKind::Author, GroupKind::Series], 3),
        (vec![GroupKind::Genre, GroupKind::Author], 3),
        (vec![GroupKind::PublishedYear, GroupKind::PublishedMonth], 3),
        (vec![GroupKind::ReadStatus, GroupKind::TitleLetter], 3),
        (vec![GroupKind::Loaned, GroupKind::Genre], 1),
        (vec![GroupKind::Series], 3),
    ];
    for (kinds, expected_leaves) in styles {
        let triggers = build_with(&shelf.db, style(&kinds), BuildStrategy::Triggers);
        let fallback = build_with(&shelf.db, style(&kinds), BuildStrategy::Fallback);
        assert_eq!(triggers, fallback, "{kinds:?}");
        let leaves = triggers.iter().filter(|r| r.1 == GroupKind::Book).count();
        assert_eq!(leaves, expected_leaves, "{kinds:?}");
    }
}

#[test]
fn visible_count_matches_reference_query() {
    let shelf = small_shelf();
    let reference: i64 = shelf
        .db
        .read(|conn| {
            Ok(conn.query_row(
                "WITH leaves AS (
                   SELECT a.id AS author, s.id AS series
                   FROM books b
                   JOIN book_author ba ON ba.book = b.id AND ba.author_position = 1
                   JOIN authors a ON a.id = ba.author
                   LEFT JOIN book_series bs ON bs.book = b.id AND bs.series_position = 1
                   LEFT JOIN series s ON s.id = bs.series
                 )
                 SELECT (SELECT count(*) FROM (SELECT DISTINCT author FROM leaves))
                      + (SELECT count(*) FROM (SELECT DISTINCT author, series FROM leaves))
                      + (SELECT count(*) FROM leaves)",
                [],
                |r| r.get(0),
            )?)
        })
        .expect("reference");

    let list = build(
        &shelf.db,
        &[GroupKind::Author, GroupKind::Series],
        PreferredState::AlwaysExpanded,
    );
    assert_eq!(list.cursor().count().expect("count"), reference);
    list.close().expect("close");

    let collapsed = build(
        &shelf.db,
        &[GroupKind::Author, GroupKind::Series],
        PreferredState::AlwaysCollapsed,
    );
    assert_eq!(collapsed.cursor().count().expect("count"), 2);
    collapsed.close().expect("close");
}

#[test]
fn rows_are_stable_across_repeated_reads() {
    let shelf = small_shelf();
    let list = build(&shelf.db, &[GroupKind::Genre], PreferredState::AlwaysExpanded);
    let cursor = list.cursor();
    let first: Vec<_> = (0..5).map(|p| cursor.row_at(p).expect("row")).collect();
    let second: Vec<_> = (0..5).rev().map(|p| cursor.row_at(p).expect("row")).collect();
    let second: Vec<_> = second.into_iter().rev().collect();
    assert_eq!(first, second);
    assert!(matches!(
        cursor.row_at(5),
        Err(BooklistError::PositionOutOfRange { position: 5, count: 5 })
    ));
    assert!(cursor.row_at(-1).is_err());
    drop(cursor);
    list.close().expect("close");
}

#[test]
fn date_parts_bucket_unparseable_dates() {
    let shelf = small_shelf();
    let list = build(&shelf.db, &[GroupKind::PublishedYear], PreferredState::AlwaysCollapsed);
    let years: Vec<Option<String>> = visible_rows(&list)
        .into_iter()
        .map(|r| r.level_1_text)
        .collect();
    assert_eq!(
        years,
        vec![
            Some("1979".to_string()),
            Some("1980".to_string()),
            Some("UNKNOWN".to_string()),
        ]
    );
    list.close().expect("close");
}

#[test]
fn mark_id_flags_one_book() {
    let shelf = small_shelf();
    let list = BooklistBuilder::new(&shelf.db, style(&[GroupKind::Author]))
        .expect("builder")
        .build(&BuildRequest {
            preferred_state: PreferredState::AlwaysExpanded,
            mark_id: Some(shelf.restaurant),
            ..BuildRequest::default()
        })
        .expect("build");
    let selected: Vec<Option<i64>> = all_rows(&list)
        .into_iter()
        .filter(|r| r.selected)
        .map(|r| r.book_id)
        .collect();
    assert_eq!(selected, vec![Some(shelf.restaurant)]);
    list.close().expect("close");
}

#[test]
fn all_authors_lists_a_book_under_each_author() {
    let shelf = small_shelf();
    shelf
        .db
        .insert_book(&NewBook::new("Good Omens").by(shelf.pratchett).by(shelf.adams))
        .expect("co-authored book");

    let primary = build(&shelf.db, &[GroupKind::Author], PreferredState::AlwaysExpanded);
    assert_eq!(primary.book_count().expect("count"), 4);
    assert_eq!(primary.unique_book_count().expect("unique"), 4);
    primary.close().expect("close");

    let style = Style::with_groups(
        "all authors",
        [Group::Author {
            all_authors: true,
            given_name_first: true,
        }],
    )
    .expect("style");
    let list = BooklistBuilder::new(&shelf.db, style)
        .expect("builder")
        .build(&BuildRequest::with_state(PreferredState::AlwaysExpanded))
        .expect("build");
    assert_eq!(list.book_count().expect("count"), 5);
    assert_eq!(list.unique_book_count().expect("unique"), 4);
    let headers: Vec<Option<String>> = all_rows(&list)
        .into_iter()
        .filter(|r| r.level == 1)
        .map(|r| r.level_1_text)
        .collect();
    assert_eq!(
        headers,
        vec![
            Some("Douglas Adams".to_string()),
            Some("Terry Pratchett".to_string()),
        ]
    );
    list.close().expect("close");
}

#[test]
fn all_series_lists_a_book_under_each_series() {
    let shelf = small_shelf();
    let dirk = shelf.db.insert_series("Dirk Gently").expect("series");
    let omnibus = shelf
        .db
        .insert_book(
            &NewBook::new("Omnibus")
                .by(shelf.adams)
                .in_series(shelf.hitchhiker, Some("3"))
                .in_series(dirk, Some("1")),
        )
        .expect("omnibus");

    let primary = build(&shelf.db, &[GroupKind::Series], PreferredState::AlwaysExpanded);
    assert_eq!(primary.book_count().expect("count"), 4);
    assert_eq!(primary.unique_book_count().expect("unique"), 4);
    assert_eq!(primary.book_positions(omnibus).expect("positions").len(), 1);
    primary.close().expect("close");

    let all_series = || {
        Style::with_groups("all series", [Group::Series { all_series: true }]).expect("style")
    };
    for strategy in [BuildStrategy::Triggers, BuildStrategy::Fallback] {
        let config = BuilderConfig {
            strategy,
            ..BuilderConfig::default()
        };
        let list = BooklistBuilder::with_config(&shelf.db, all_series(), config)
            .expect("builder")
            .build(&BuildRequest::with_state(PreferredState::AlwaysExpanded))
            .expect("build");
        assert_eq!(list.book_count().expect("count"), 5, "{strategy:?}");
        assert_eq!(list.unique_book_count().expect("unique"), 4, "{strategy:?}");

        let headers: Vec<(Option<String>, i64)> = all_rows(&list)
            .into_iter()
            .filter(|r| r.level == 1)
            .map(|r| (r.level_1_text, r.book_count))
            .collect();
        assert_eq!(
            headers,
            vec![
                (None, 1),
                (Some("Dirk Gently".to_string()), 1),
                (Some("Hitchhiker's Guide".to_string()), 3),
            ],
            "{strategy:?}"
        );

        let positions = list.book_positions(omnibus).expect("positions");
        assert_eq!(positions.len(), 2, "{strategy:?}");
        assert_ne!(positions[0].root_key, positions[1].root_key);
        list.close().expect("close");
    }

    assert_eq!(
        build_with(&shelf.db, all_series(), BuildStrategy::Triggers),
        build_with(&shelf.db, all_series(), BuildStrategy::Fallback)
    );
}

#[test]
fn case_sensitive_collation_is_folded() {
    let db = Database::open_in_memory().expect("open");
    let dickens = db.insert_author("Dickens", "Charles").expect("author");
    let de_vries = db.insert_author("de Vries", "Anke").expect("author");
    db.insert_books(&[
        NewBook::new("Bleak House").by(dickens),
        NewBook::new("Bruises").by(de_vries),
    ])
    .expect("books");

    let config = BuilderConfig {
        collation: "BINARY".to_string(),
        ..BuilderConfig::default()
    };
    let list = BooklistBuilder::with_config(&db, style(&[GroupKind::Author]), config)
        .expect("builder")
        .build(&BuildRequest::with_state(PreferredState::AlwaysCollapsed))
        .expect("build");
    let names: Vec<Option<String>> = visible_rows(&list)
        .into_iter()
        .map(|r| r.level_1_text)
        .collect();
    assert_eq!(
        names,
        vec![
            Some("de Vries, Anke".to_string()),
            Some("Dickens, Charles".to_string()),
        ]
    );
    list.close().expect("close");
}

#[test]
fn extra_domains_are_reported_per_row() {
    let shelf = small_shelf();
    let mut builder = BooklistBuilder::new(&shelf.db, style(&[GroupKind::Genre])).expect("builder");
    builder
        .require_domain(
            Domain::named("description", ColumnType::Text),
            "b.description",
            false,
        )
        .expect("description");
    // Same definition as the built-in title column.
    builder
        .require_domain(domains::TITLE, "b.title", true)
        .expect("title");
    let list = builder
        .build(&BuildRequest::with_state(PreferredState::AlwaysExpanded))
        .expect("build");

    let restaurant = all_rows(&list)
        .into_iter()
        .find(|r| r.book_id == Some(shelf.restaurant))
        .expect("restaurant row");
    assert_eq!(
        restaurant.extras.get("description"),
        Some(&Value::Text("Dinner at the end of time".to_string()))
    );
    assert_eq!(
        restaurant.extras.get("title"),
        Some(&Value::Text("The Restaurant at the End of the Universe".to_string()))
    );
    list.close().expect("close");
}

#[test]
fn rebuild_reflects_new_books() {
    let shelf = small_shelf();
    let list = build(&shelf.db, &[GroupKind::Genre], PreferredState::AlwaysExpanded);
    let cursor = list.cursor();
    assert_eq!(cursor.count().expect("count"), 5);
    let generation = list.generation();

    let mut book = NewBook::new("Guards! Guards!").by(shelf.pratchett);
    book.genre = Some("Fantasy".to_string());
    shelf.db.insert_book(&book).expect("insert");

    // Stale until rebuilt.
    assert_eq!(cursor.count().expect("count"), 5);
    list.rebuild().expect("rebuild");
    assert!(list.generation() > generation);
    assert_eq!(cursor.count().expect("count"), 6);
    assert_eq!(cursor.book_count().expect("books"), 4);
    let fantasy = cursor.row_at(0).expect("header");
    assert_eq!(fantasy.level_1_text.as_deref(), Some("Fantasy"));
    assert_eq!(fantasy.book_count, 2);
    drop(cursor);
    list.close().expect("close");
}

#[test]
fn close_drops_temporary_tables() {
    let shelf = small_shelf();
    let list = build(&shelf.db, &[GroupKind::Genre], PreferredState::Preserved);
    let tables = list.tables().clone();
    list.close().expect("close");
    let remaining: i64 = shelf
        .db
        .read(|conn| {
            Ok(conn.query_row(
                "SELECT count(*) FROM sqlite_temp_master WHERE type = 'table' AND name IN (?1, ?2, ?3)",
                [tables.list(), tables.navigation(), tables.last_header()],
                |r| r.get(0),
            )?)
        })
        .expect("query");
    assert_eq!(remaining, 0);
}

#[test]
fn concurrent_lists_use_distinct_tables() {
    let shelf = small_shelf();
    let first = build(&shelf.db, &[GroupKind::Genre], PreferredState::AlwaysExpanded);
    let second = build(&shelf.db, &[GroupKind::Author], PreferredState::AlwaysExpanded);
    assert_ne!(first.tables().list(), second.tables().list());
    assert_eq!(first.visible_count().expect("count"), 5);
    assert_eq!(second.visible_count().expect("count"), 5);
    first.close().expect("close");
    second.close().expect("close");
}

#[test]
fn book_kind_cannot_be_a_level() {
    let mut style = Style::new("bad");
    assert!(style.add_group(Group::Book).is_err());
    style.add_group(Group::Genre).expect("genre");
    assert_eq!(style.leaf_level(), 2);
}

#[test]
fn table_names_come_from_the_injected_allocator() {
    let ids = std::sync::Arc::new(booklist_core::IdAllocator::starting_at(100));
    let conn = rusqlite::Connection::open_in_memory().expect("open");
    let db = Database::from_connection(conn, ids.clone()).expect("database");
    let list = build(&db, &[GroupKind::Genre], PreferredState::Preserved);
    assert_eq!(list.tables().list(), "book_list_100");
    assert_eq!(list.tables().navigation(), "book_list_nav_100");
    assert_eq!(ids.next_id(), 101);
    list.close().expect("close");
}
