//! SQLite-backed hierarchical book lists.
//!
//! A [`Style`] is an ordered list of [`Group`]s (author, series, genre, date
//! parts, ...). [`BooklistBuilder::build`] materializes the matching books into
//! a temporary table holding every leaf and summary row, plus a navigation
//! table that maps absolute positions to rows and tracks which nodes are
//! expanded. The resulting [`BuiltList`] is read through a windowed
//! [`BooklistCursor`] and mutated through its expand/collapse operations.
//!
//! Every statement against the shared connection runs under the
//! [`Synchronizer`], a reentrant shared/exclusive lock.

pub mod builder;
mod catalog;
mod cursor;
mod database;
pub mod date;
mod group;
mod list;
mod nodes;
mod row;
pub mod schema;
mod style;
pub mod sync;

pub use builder::{BooklistBuilder, BuildRequest, BuildStrategy, BuilderConfig, PreferredState};
pub use catalog::{NewBook, SeriesEntry};
pub use cursor::{BooklistCursor, CursorConfig, CursorStats};
pub use database::{BooklistError, Database, IdAllocator, Result};
pub use group::{CompoundKey, Group, GroupColumn, GroupKind};
pub use list::BuiltList;
pub use row::{BookPosition, BooklistRow};
pub use schema::{domains, ColumnType, Domain, ListTables};
pub use style::{ReadFilter, Style, STYLE_SCHEMA_VERSION};
pub use sync::{ExclusiveLock, SharedLock, Synchronizer};
