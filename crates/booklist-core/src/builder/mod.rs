//! Materializes a [`Style`] into a temporary list table plus its navigation
//! table.
//!
//! A [`BooklistBuilder`] only holds configuration. Every call to
//! [`BooklistBuilder::build`] allocates fresh, uniquely named temporary tables
//! and returns them as a [`BuiltList`] owned by the caller.

mod domains;
pub(crate) mod sql;

use crate::database::{BooklistError, Database, Result};
use crate::list::BuiltList;
use crate::schema::{Domain, ListTables};
use crate::style::Style;
use sql::{is_identifier, BuildPlan, Collation, ExtraDomain};
use std::time::Instant;

/// How summary rows are produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStrategy {
    /// Leaves are inserted in final order and per-level triggers emit each
    /// header just before its first child.
    #[default]
    Triggers,
    /// Leaves are inserted unordered, each level is aggregated with
    /// `GROUP BY`, and the navigation table is ordered by a sort index.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    pub strategy: BuildStrategy,
    /// Collation applied to text sort terms (default: `NOCASE`).
    pub collation: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            strategy: BuildStrategy::Triggers,
            collation: "NOCASE".to_string(),
        }
    }
}

/// Initial expand/collapse state of a freshly built list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferredState {
    AlwaysExpanded,
    AlwaysCollapsed,
    /// Reopen the top-level nodes recorded in the node settings table.
    #[default]
    Preserved,
}

/// Per-build inputs. Blank strings are treated as "no filter".
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub preferred_state: PreferredState,
    /// Book flagged through the `selected` column.
    pub mark_id: Option<i64>,
    /// Bookshelf name.
    pub bookshelf: Option<String>,
    /// Raw SQL predicate over the `a` (authors) alias.
    pub author_where: Option<String>,
    /// Raw SQL predicate over the `b` (books) alias.
    pub book_where: Option<String>,
    pub loaned_to: Option<String>,
    pub series_name: Option<String>,
    /// Free text matched against the full-text index as word prefixes.
    pub search_text: Option<String>,
}

impl BuildRequest {
    pub fn with_state(preferred_state: PreferredState) -> Self {
        Self {
            preferred_state,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct BooklistBuilder {
    db: Database,
    style: Style,
    config: BuilderConfig,
    extras: Vec<ExtraDomain>,
}

impl BooklistBuilder {
    pub fn new(db: &Database, style: Style) -> Result<Self> {
        Self::with_config(db, style, BuilderConfig::default())
    }

    pub fn with_config(db: &Database, style: Style, config: BuilderConfig) -> Result<Self> {
        style.validate()?;
        if !is_identifier(&config.collation) {
            return Err(BooklistError::InvalidCollation(config.collation));
        }
        Ok(Self {
            db: db.clone(),
            style,
            config,
            extras: Vec::new(),
        })
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Add a caller-defined column to every leaf row. Its value is reported in
    /// [`BooklistRow::extras`](crate::BooklistRow::extras) under the domain name.
    ///
    /// Registering a name a second time is allowed only with the same
    /// expression and column type.
    pub fn require_domain(
        &mut self,
        domain: Domain,
        expression: impl Into<String>,
        sorted: bool,
    ) -> Result<()> {
        let mut extras = self.extras.clone();
        extras.push(ExtraDomain {
            domain,
            expression: expression.into(),
            sorted,
        });
        // A trial plan surfaces conflicts with group columns now rather than
        // at build time.
        BuildPlan::new(&self.style, &extras, &BuildRequest::default())?;
        self.extras = extras;
        Ok(())
    }

    /// Create and populate a new pair of temporary tables in one transaction.
    pub fn build(&self, request: &BuildRequest) -> Result<BuiltList> {
        let started = Instant::now();
        let plan = BuildPlan::new(&self.style, &self.extras, request)?;
        let tables = ListTables::new(self.db.next_instance_id());

        let statements = self.db.transaction(|tx| {
            let collation = Collation::probe(tx, &self.config.collation)?;
            let sql = plan.sql(&tables, self.config.strategy, &collation, request.preferred_state);

            tx.execute_batch(&sql.create)?;
            sql.compiled.leaf.execute(tx)?;
            for level in &sql.compiled.levels {
                level.execute(tx)?;
            }
            if let Some(index) = &sql.sort_index {
                tx.execute_batch(index)?;
            }
            sql.compiled.navigation.execute(tx)?;
            tx.execute_batch(&sql.navigation_indexes)?;
            tx.execute_batch(&sql.compiled.analyze)?;
            Ok(sql.compiled)
        })?;

        log::debug!(
            "built {} for style {:?} ({:?}, {} levels) in {:?}",
            tables.list(),
            self.style.name,
            self.config.strategy,
            self.style.len(),
            started.elapsed()
        );
        Ok(BuiltList::new(self.db.clone(), tables, statements, &plan))
    }
}
