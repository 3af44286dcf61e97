//! Grouping levels of a book list.
//!
//! A [`Group`] is one level of the hierarchy. Each variant knows which derived
//! columns it contributes to the list table, which of them it groups and sorts
//! by, which one is displayed, and the [`CompoundKey`] that names its nodes
//! independently of row ids.

use crate::database::BooklistError;
use crate::date;
use crate::schema::{domains, Domain};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Stable numeric identity of a group kind.
///
/// The ids are stored in the list table's `kind` column and in the persisted
/// node settings, so existing values must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Book,
    Author,
    Series,
    Genre,
    Publisher,
    ReadStatus,
    Loaned,
    PublishedYear,
    PublishedMonth,
    TitleLetter,
    AddedYear,
    AddedMonth,
    AddedDay,
    Format,
    ReadYear,
    ReadMonth,
    ReadDay,
    Location,
    Language,
    PublishedDay,
}

impl GroupKind {
    pub const ALL: [GroupKind; 20] = [
        GroupKind::Book,
        GroupKind::Author,
        GroupKind::Series,
        GroupKind::Genre,
        GroupKind::Publisher,
        GroupKind::ReadStatus,
        GroupKind::Loaned,
        GroupKind::PublishedYear,
        GroupKind::PublishedMonth,
        GroupKind::TitleLetter,
        GroupKind::AddedYear,
        GroupKind::AddedMonth,
        GroupKind::AddedDay,
        GroupKind::Format,
        GroupKind::ReadYear,
        GroupKind::ReadMonth,
        GroupKind::ReadDay,
        GroupKind::Location,
        GroupKind::Language,
        GroupKind::PublishedDay,
    ];

    pub fn id(self) -> i64 {
        match self {
            GroupKind::Book => 0,
            GroupKind::Author => 1,
            GroupKind::Series => 2,
            GroupKind::Genre => 3,
            GroupKind::Publisher => 4,
            GroupKind::ReadStatus => 5,
            GroupKind::Loaned => 6,
            GroupKind::PublishedYear => 7,
            GroupKind::PublishedMonth => 8,
            GroupKind::TitleLetter => 9,
            GroupKind::AddedYear => 10,
            GroupKind::AddedMonth => 11,
            GroupKind::AddedDay => 12,
            GroupKind::Format => 13,
            GroupKind::ReadYear => 14,
            GroupKind::ReadMonth => 15,
            GroupKind::ReadDay => 16,
            GroupKind::Location => 17,
            GroupKind::Language => 19,
            GroupKind::PublishedDay => 20,
        }
    }

    pub fn from_id(id: i64) -> Result<Self, BooklistError> {
        GroupKind::ALL
            .into_iter()
            .find(|kind| kind.id() == id)
            .ok_or(BooklistError::UnknownGroupKind(id))
    }
}

impl ToSql for GroupKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.id()))
    }
}

impl FromSql for GroupKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let id = i64::column_result(value)?;
        GroupKind::from_id(id).map_err(|_| FromSqlError::OutOfRange(id))
    }
}

/// One level of the hierarchy, with per-kind options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Group {
    /// The leaf level. Implicit in every style; never a valid style level.
    Book,
    Author {
        /// List a book under every one of its authors instead of only the
        /// primary author.
        #[serde(default)]
        all_authors: bool,
        /// Display "Given Family" instead of "Family, Given".
        #[serde(default)]
        given_name_first: bool,
    },
    Series {
        /// List a book under every series it belongs to instead of only the
        /// primary one.
        #[serde(default)]
        all_series: bool,
    },
    Genre,
    Publisher,
    ReadStatus,
    Loaned,
    TitleLetter,
    PublishedYear,
    PublishedMonth,
    PublishedDay,
    AddedYear,
    AddedMonth,
    AddedDay,
    ReadYear,
    ReadMonth,
    ReadDay,
    Location,
    Language,
    Format,
}

/// How a derived column participates in a level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupColumn {
    pub domain: Domain,
    /// SQL over the source aliases (`b` books, `a` authors, `s` series,
    /// `bs` book_series, `l` loan).
    pub expression: String,
    pub grouped: bool,
    pub sorted: bool,
}

impl GroupColumn {
    fn keyed(domain: Domain, expression: impl Into<String>) -> Self {
        Self {
            domain,
            expression: expression.into(),
            grouped: true,
            sorted: true,
        }
    }

    fn grouped_only(domain: Domain, expression: impl Into<String>) -> Self {
        Self {
            domain,
            expression: expression.into(),
            grouped: true,
            sorted: false,
        }
    }

    fn sorted_only(domain: Domain, expression: impl Into<String>) -> Self {
        Self {
            domain,
            expression: expression.into(),
            grouped: false,
            sorted: true,
        }
    }
}

/// Prefix plus ordered domains naming a node independently of row ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundKey {
    pub prefix: &'static str,
    pub domains: Vec<Domain>,
}

impl CompoundKey {
    fn single(prefix: &'static str, domain: Domain) -> Self {
        Self {
            prefix,
            domains: vec![domain],
        }
    }

    /// SQL building `prefix/value[/prefix/value...]`, given the expression
    /// that produces each key domain.
    pub(crate) fn root_key_expression(&self, expression_for: impl Fn(&Domain) -> String) -> String {
        let parts: Vec<String> = self
            .domains
            .iter()
            .map(|domain| {
                let value = expression_for(domain);
                format!("'{}' || '/' || coalesce({value}, '')", self.prefix)
            })
            .collect();
        parts.join(" || '/' || ")
    }
}

const AUTHOR_FAMILY_FIRST: &str =
    "CASE WHEN a.given_names = '' THEN a.family_name ELSE a.family_name || ', ' || a.given_names END";
const AUTHOR_GIVEN_FIRST: &str =
    "CASE WHEN a.given_names = '' THEN a.family_name ELSE a.given_names || ' ' || a.family_name END";

impl Group {
    pub fn kind(&self) -> GroupKind {
        match self {
            Group::Book => GroupKind::Book,
            Group::Author { .. } => GroupKind::Author,
            Group::Series { .. } => GroupKind::Series,
            Group::Genre => GroupKind::Genre,
            Group::Publisher => GroupKind::Publisher,
            Group::ReadStatus => GroupKind::ReadStatus,
            Group::Loaned => GroupKind::Loaned,
            Group::TitleLetter => GroupKind::TitleLetter,
            Group::PublishedYear => GroupKind::PublishedYear,
            Group::PublishedMonth => GroupKind::PublishedMonth,
            Group::PublishedDay => GroupKind::PublishedDay,
            Group::AddedYear => GroupKind::AddedYear,
            Group::AddedMonth => GroupKind::AddedMonth,
            Group::AddedDay => GroupKind::AddedDay,
            Group::ReadYear => GroupKind::ReadYear,
            Group::ReadMonth => GroupKind::ReadMonth,
            Group::ReadDay => GroupKind::ReadDay,
            Group::Location => GroupKind::Location,
            Group::Language => GroupKind::Language,
            Group::Format => GroupKind::Format,
        }
    }

    /// Default-option group for a kind.
    pub fn from_kind(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Book => Group::Book,
            GroupKind::Author => Group::Author {
                all_authors: false,
                given_name_first: false,
            },
            GroupKind::Series => Group::Series { all_series: false },
            GroupKind::Genre => Group::Genre,
            GroupKind::Publisher => Group::Publisher,
            GroupKind::ReadStatus => Group::ReadStatus,
            GroupKind::Loaned => Group::Loaned,
            GroupKind::TitleLetter => Group::TitleLetter,
            GroupKind::PublishedYear => Group::PublishedYear,
            GroupKind::PublishedMonth => Group::PublishedMonth,
            GroupKind::PublishedDay => Group::PublishedDay,
            GroupKind::AddedYear => Group::AddedYear,
            GroupKind::AddedMonth => Group::AddedMonth,
            GroupKind::AddedDay => Group::AddedDay,
            GroupKind::ReadYear => Group::ReadYear,
            GroupKind::ReadMonth => Group::ReadMonth,
            GroupKind::ReadDay => Group::ReadDay,
            GroupKind::Location => Group::Location,
            GroupKind::Language => Group::Language,
            GroupKind::Format => Group::Format,
        }
    }

    /// Derived columns this level adds to the list table, in sort order.
    pub fn columns(&self) -> Result<Vec<GroupColumn>, BooklistError> {
        let columns = match *self {
            Group::Book => return Err(BooklistError::UnsupportedGroupKind(GroupKind::Book)),
            Group::Author {
                given_name_first, ..
            } => vec![
                GroupColumn::keyed(domains::AUTHOR_SORT, AUTHOR_FAMILY_FIRST),
                GroupColumn::keyed(domains::AUTHOR_ID, "a.id"),
                GroupColumn::grouped_only(
                    domains::AUTHOR_FORMATTED,
                    if given_name_first {
                        AUTHOR_GIVEN_FIRST
                    } else {
                        AUTHOR_FAMILY_FIRST
                    },
                ),
            ],
            Group::Series { .. } => vec![
                GroupColumn::keyed(domains::SERIES_NAME, "s.series_name"),
                GroupColumn::keyed(domains::SERIES_ID, "s.id"),
                GroupColumn::sorted_only(domains::SERIES_NUM, "CAST(bs.series_num AS REAL)"),
            ],
            Group::Genre => vec![GroupColumn::keyed(domains::GENRE, "b.genre")],
            Group::Publisher => vec![GroupColumn::keyed(domains::PUBLISHER, "b.publisher")],
            Group::Location => vec![GroupColumn::keyed(domains::LOCATION, "b.location")],
            Group::Language => vec![GroupColumn::keyed(domains::LANGUAGE, "b.language")],
            Group::Format => vec![GroupColumn::keyed(domains::FORMAT, "b.format")],
            Group::ReadStatus => vec![
                GroupColumn::keyed(domains::READ, "b.read"),
                GroupColumn::grouped_only(
                    domains::READ_STATUS,
                    "CASE WHEN b.read = 1 THEN 'Read' ELSE 'Unread' END",
                ),
            ],
            Group::Loaned => vec![GroupColumn::keyed(domains::LOANED_TO, "l.loaned_to")],
            Group::TitleLetter => vec![GroupColumn::keyed(
                domains::TITLE_LETTER,
                "upper(substr(b.title, 1, 1))",
            )],
            Group::PublishedYear => vec![GroupColumn::keyed(
                domains::PUBLISHED_YEAR,
                date::year_expr("b.date_published"),
            )],
            Group::PublishedMonth => vec![GroupColumn::keyed(
                domains::PUBLISHED_MONTH,
                date::month_expr("b.date_published"),
            )],
            Group::PublishedDay => vec![GroupColumn::keyed(
                domains::PUBLISHED_DAY,
                date::day_expr("b.date_published"),
            )],
            Group::AddedYear => vec![GroupColumn::keyed(
                domains::ADDED_YEAR,
                date::year_expr("b.date_added"),
            )],
            Group::AddedMonth => vec![GroupColumn::keyed(
                domains::ADDED_MONTH,
                date::month_expr("b.date_added"),
            )],
            Group::AddedDay => vec![GroupColumn::keyed(
                domains::ADDED_DAY,
                date::day_expr("b.date_added"),
            )],
            Group::ReadYear => vec![GroupColumn::keyed(
                domains::READ_YEAR,
                date::year_expr("b.read_end"),
            )],
            Group::ReadMonth => vec![GroupColumn::keyed(
                domains::READ_MONTH,
                date::month_expr("b.read_end"),
            )],
            Group::ReadDay => vec![GroupColumn::keyed(
                domains::READ_DAY,
                date::day_expr("b.read_end"),
            )],
        };
        Ok(columns)
    }

    /// The column shown to the user for nodes of this level.
    pub fn display_domain(&self) -> Domain {
        match self {
            Group::Book => domains::TITLE,
            Group::Author { .. } => domains::AUTHOR_FORMATTED,
            Group::Series { .. } => domains::SERIES_NAME,
            Group::Genre => domains::GENRE,
            Group::Publisher => domains::PUBLISHER,
            Group::ReadStatus => domains::READ_STATUS,
            Group::Loaned => domains::LOANED_TO,
            Group::TitleLetter => domains::TITLE_LETTER,
            Group::PublishedYear => domains::PUBLISHED_YEAR,
            Group::PublishedMonth => domains::PUBLISHED_MONTH,
            Group::PublishedDay => domains::PUBLISHED_DAY,
            Group::AddedYear => domains::ADDED_YEAR,
            Group::AddedMonth => domains::ADDED_MONTH,
            Group::AddedDay => domains::ADDED_DAY,
            Group::ReadYear => domains::READ_YEAR,
            Group::ReadMonth => domains::READ_MONTH,
            Group::ReadDay => domains::READ_DAY,
            Group::Location => domains::LOCATION,
            Group::Language => domains::LANGUAGE,
            Group::Format => domains::FORMAT,
        }
    }

    pub fn compound_key(&self) -> CompoundKey {
        match self {
            Group::Book => CompoundKey::single("b", domains::BOOK),
            Group::Author { .. } => CompoundKey::single("a", domains::AUTHOR_ID),
            Group::Series { .. } => CompoundKey::single("s", domains::SERIES_ID),
            Group::Genre => CompoundKey::single("g", domains::GENRE),
            Group::Publisher => CompoundKey::single("p", domains::PUBLISHER),
            Group::ReadStatus => CompoundKey::single("r", domains::READ),
            Group::Loaned => CompoundKey::single("l", domains::LOANED_TO),
            Group::TitleLetter => CompoundKey::single("t", domains::TITLE_LETTER),
            Group::PublishedYear => CompoundKey::single("yp", domains::PUBLISHED_YEAR),
            Group::PublishedMonth => CompoundKey::single("mp", domains::PUBLISHED_MONTH),
            Group::PublishedDay => CompoundKey::single("dp", domains::PUBLISHED_DAY),
            Group::AddedYear => CompoundKey::single("ya", domains::ADDED_YEAR),
            Group::AddedMonth => CompoundKey::single("ma", domains::ADDED_MONTH),
            Group::AddedDay => CompoundKey::single("da", domains::ADDED_DAY),
            Group::ReadYear => CompoundKey::single("yr", domains::READ_YEAR),
            Group::ReadMonth => CompoundKey::single("mr", domains::READ_MONTH),
            Group::ReadDay => CompoundKey::single("dr", domains::READ_DAY),
            Group::Location => CompoundKey::single("loc", domains::LOCATION),
            Group::Language => CompoundKey::single("lang", domains::LANGUAGE),
            Group::Format => CompoundKey::single("fmt", domains::FORMAT),
        }
    }

    /// Whether the leaf join should take every author of a book.
    pub(crate) fn wants_all_authors(&self) -> bool {
        matches!(self, Group::Author { all_authors: true, .. })
    }

    pub(crate) fn wants_all_series(&self) -> bool {
        matches!(self, Group::Series { all_series: true })
    }
}
