//! SQL assembly for one build: derived columns, joins, filters, sort terms and
//! the statements that populate the list and navigation tables.

use super::domains::DomainRegistry;
use super::{BuildRequest, BuildStrategy, PreferredState};
use crate::database::{BooklistError, Result};
use crate::group::GroupKind;
use crate::row::RowLayout;
use crate::schema::{domains, Domain, ListTables, NODE_SETTINGS_TABLE};
use crate::style::{ReadFilter, Style};
use rusqlite::types::Value;
use rusqlite::{Connection, ToSql};
use unicode_normalization::UnicodeNormalization;

/// A caller-requested column added to every leaf row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExtraDomain {
    pub domain: Domain,
    pub expression: String,
    pub sorted: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct LevelPlan {
    pub level: i64,
    pub kind: GroupKind,
    /// Grouped domains of this level and every outer level.
    pub grouped: Vec<Domain>,
}

#[derive(Debug, Clone)]
struct SortTerm {
    domain: Domain,
    collated: bool,
}

impl SortTerm {
    fn collated(domain: Domain) -> Self {
        Self {
            domain,
            collated: true,
        }
    }

    fn raw(domain: Domain) -> Self {
        Self {
            domain,
            collated: false,
        }
    }

    fn render(&self, collation: &Collation) -> String {
        let name = self.domain.name();
        if !self.collated || !self.domain.is_text() {
            return name.to_string();
        }
        if collation.case_sensitive {
            format!("lower({name}) COLLATE {}", collation.name)
        } else {
            format!("{name} COLLATE {}", collation.name)
        }
    }
}

/// Text collation used for sort terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Collation {
    pub name: String,
    pub case_sensitive: bool,
}

impl Collation {
    /// Check whether `name` orders `'a'` before `'B'`; if it does not, it is
    /// case sensitive and text sort terms get folded with `lower()`.
    pub fn probe(conn: &Connection, name: &str) -> Result<Self> {
        if !is_identifier(name) {
            return Err(BooklistError::InvalidCollation(name.to_string()));
        }
        let folds: bool = conn.query_row(&format!("SELECT 'a' < 'B' COLLATE {name}"), [], |r| r.get(0))?;
        Ok(Self {
            name: name.to_string(),
            case_sensitive: !folds,
        })
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A statement kept by name so the list can be repopulated without
/// re-deriving the style.
#[derive(Debug, Clone)]
pub(crate) struct NamedStatement {
    pub name: String,
    pub sql: String,
    pub params: Vec<(String, Value)>,
}

impl NamedStatement {
    fn new(name: impl Into<String>, sql: String) -> Self {
        Self {
            name: name.into(),
            sql,
            params: Vec::new(),
        }
    }

    pub fn execute(&self, conn: &Connection) -> Result<usize> {
        let mut stmt = conn.prepare_cached(&self.sql)?;
        let params: Vec<(&str, &dyn ToSql)> = self
            .params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        let rows = stmt.execute(params.as_slice())?;
        log::trace!("{}: {rows} rows", self.name);
        Ok(rows)
    }
}

/// Population statements of a built list, in execution order.
#[derive(Debug, Clone)]
pub(crate) struct CompiledStatements {
    pub clear: String,
    pub leaf: NamedStatement,
    pub levels: Vec<NamedStatement>,
    pub navigation: NamedStatement,
    pub analyze: String,
}

impl CompiledStatements {
    /// Empty both tables and run every population statement again.
    pub fn repopulate(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&self.clear)?;
        self.leaf.execute(conn)?;
        for level in &self.levels {
            level.execute(conn)?;
        }
        self.navigation.execute(conn)?;
        conn.execute_batch(&self.analyze)?;
        Ok(())
    }
}

/// Everything needed to create and populate the tables of one build.
#[derive(Debug)]
pub(crate) struct BuildSql {
    /// Tables, the level index and, for the trigger strategy, the scratch
    /// table and header triggers.
    pub create: String,
    /// Covering index on the sort terms (fallback strategy only).
    pub sort_index: Option<String>,
    pub navigation_indexes: String,
    pub compiled: CompiledStatements,
}

#[derive(Debug, Clone)]
pub(crate) struct BuildPlan {
    registry: DomainRegistry,
    levels: Vec<LevelPlan>,
    sort: Vec<SortTerm>,
    leaf_level: i64,
    outer_kind: GroupKind,
    root_key: String,
    from: String,
    where_clause: String,
    params: Vec<(String, Value)>,
    layout: RowLayout,
}

impl BuildPlan {
    pub fn new(style: &Style, extras: &[ExtraDomain], request: &BuildRequest) -> Result<Self> {
        style.validate()?;
        let outer = style.outer_group().ok_or(BooklistError::EmptyStyle)?;

        let mut registry = DomainRegistry::default();
        let mut levels = Vec::with_capacity(style.len());
        let mut sort = Vec::new();
        let mut trailing = Vec::new();
        let mut grouped: Vec<Domain> = Vec::new();

        for (idx, group) in style.groups().iter().enumerate() {
            let mut own_grouped = Vec::new();
            for column in group.columns()? {
                registry.require_column(&column)?;
                if column.grouped {
                    if column.sorted {
                        sort.push(SortTerm::collated(column.domain.clone()));
                    }
                    if !grouped.contains(&column.domain) {
                        grouped.push(column.domain.clone());
                    }
                    own_grouped.push(column.domain);
                } else if column.sorted {
                    trailing.push(SortTerm::collated(column.domain));
                }
            }
            // Raw group values keep every group contiguous even when collated
            // terms tie (e.g. "Smith" and "smith" under NOCASE).
            sort.extend(own_grouped.into_iter().map(SortTerm::raw));
            levels.push(LevelPlan {
                level: idx as i64 + 1,
                kind: group.kind(),
                grouped: grouped.clone(),
            });
        }

        let mut params = Vec::new();
        let mark = match request.mark_id {
            Some(id) => {
                params.push((":mark_id".to_string(), Value::Integer(id)));
                "CASE WHEN b.id = :mark_id THEN 1 ELSE 0 END"
            }
            None => "0",
        };

        registry.require(&domains::BOOK, "b.id", false)?;
        registry.require(&domains::BOOK_UUID, "b.book_uuid", false)?;
        registry.require(&domains::TITLE, "b.title", true)?;
        registry.require(&domains::READ, "b.read", false)?;
        registry.require(&domains::AUTHOR_ID, "a.id", false)?;
        registry.require(&domains::SERIES_ID, "s.id", false)?;
        registry.require(&domains::SELECTED, mark, false)?;
        trailing.push(SortTerm::collated(domains::TITLE));

        for extra in extras {
            registry.require(&extra.domain, &extra.expression, extra.sorted)?;
            if extra.sorted {
                trailing.push(SortTerm::collated(extra.domain.clone()));
            }
        }
        sort.extend(trailing);
        sort.push(SortTerm::raw(domains::BOOK));

        let root_key = outer.compound_key().root_key_expression(|domain| {
            registry
                .get(domain.name())
                .map(|details| details.expression.clone())
                .unwrap_or_else(|| "NULL".to_string())
        });

        let from = from_clause(style, request);
        let where_clause = where_clause(style, request, &mut params);

        let layout = RowLayout {
            level_1: outer.display_domain().name().to_string(),
            level_2: style
                .groups()
                .get(1)
                .map(|g| g.display_domain().name().to_string()),
            extras: extras.iter().map(|e| e.domain.name().to_string()).collect(),
        };

        Ok(Self {
            registry,
            levels,
            sort,
            leaf_level: style.leaf_level(),
            outer_kind: outer.kind(),
            root_key,
            from,
            where_clause,
            params,
            layout,
        })
    }

    pub fn leaf_level(&self) -> i64 {
        self.leaf_level
    }

    pub fn outer_kind(&self) -> GroupKind {
        self.outer_kind
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    fn sort_terms(&self, collation: &Collation) -> Vec<String> {
        let mut terms: Vec<String> = Vec::with_capacity(self.sort.len());
        for term in &self.sort {
            let rendered = term.render(collation);
            if !terms.contains(&rendered) {
                terms.push(rendered);
            }
        }
        terms
    }

    pub fn sql(
        &self,
        tables: &ListTables,
        strategy: BuildStrategy,
        collation: &Collation,
        preferred: PreferredState,
    ) -> BuildSql {
        let list = tables.list();
        let nav = tables.navigation();
        let hdr = tables.last_header();
        let sort_terms = self.sort_terms(collation).join(", ");

        let mut create = String::new();
        create.push_str(&tables.create_list_sql(&self.registry.domains()));
        create.push_str(";\n");
        create.push_str(&tables.create_navigation_sql());
        create.push_str(";\n");
        create.push_str(&format!("CREATE INDEX {list}_level ON {list} (level);\n"));

        let mut clear = format!("DELETE FROM {nav};\nDELETE FROM {list};");
        let mut levels = Vec::new();
        let mut sort_index = None;

        match strategy {
            BuildStrategy::Triggers => {
                create.push_str(&self.trigger_sql(tables));
                clear.push_str(&format!("\nDELETE FROM {hdr};"));
            }
            BuildStrategy::Fallback => {
                for plan in self.levels.iter().rev() {
                    let cols = column_list(&plan.grouped);
                    levels.push(NamedStatement::new(
                        format!("level_{}", plan.level),
                        format!(
                            "INSERT INTO {list} (level, kind, book_count, root_key, {cols})\n\
                             SELECT {level}, {kind}, sum(book_count), root_key, {cols}\n\
                             FROM {list}\n\
                             WHERE level = {child}\n\
                             GROUP BY root_key, {cols}",
                            level = plan.level,
                            kind = plan.kind.id(),
                            child = plan.level + 1,
                        ),
                    ));
                }
                sort_index = Some(format!(
                    "CREATE INDEX {list}_sort ON {list} ({sort_terms}, level)"
                ));
            }
        }

        let mut leaf = NamedStatement::new("leaf", self.leaf_insert_sql(list, strategy, &sort_terms));
        leaf.params = self.params.clone();

        let (visible, expanded, join) = match preferred {
            PreferredState::AlwaysExpanded => ("1", "1", String::new()),
            PreferredState::AlwaysCollapsed => {
                ("CASE WHEN l.level = 1 THEN 1 ELSE 0 END", "0", String::new())
            }
            PreferredState::Preserved => (
                "CASE WHEN l.level = 1 THEN 1 WHEN ns.root_key IS NULL THEN 0 ELSE 1 END",
                "CASE WHEN ns.root_key IS NULL THEN 0 ELSE 1 END",
                format!(
                    "\nLEFT OUTER JOIN {NODE_SETTINGS_TABLE} ns ON ns.kind = {} AND ns.root_key = l.root_key",
                    self.outer_kind.id()
                ),
            ),
        };
        let order = match strategy {
            BuildStrategy::Triggers => "l.id".to_string(),
            BuildStrategy::Fallback => format!("{sort_terms}, l.level"),
        };
        let navigation = NamedStatement::new(
            "navigation",
            format!(
                "INSERT INTO {nav} (list_id, level, root_key, visible, expanded)\n\
                 SELECT l.id, l.level, l.root_key, {visible}, {expanded}\n\
                 FROM {list} l{join}\n\
                 ORDER BY {order}"
            ),
        );

        BuildSql {
            create,
            sort_index,
            navigation_indexes: format!(
                "CREATE INDEX {nav}_lek ON {nav} (level, expanded, root_key);\n\
                 CREATE UNIQUE INDEX {nav}_list ON {nav} (list_id);"
            ),
            compiled: CompiledStatements {
                clear,
                leaf,
                levels,
                navigation,
                analyze: format!("ANALYZE {list};\nANALYZE {nav};"),
            },
        }
    }

    fn leaf_insert_sql(&self, list: &str, strategy: BuildStrategy, sort_terms: &str) -> String {
        let columns: Vec<&str> = self.registry.iter().map(|e| e.domain.name()).collect();
        let cols = columns.join(", ");
        let select_list: Vec<String> = self
            .registry
            .iter()
            .map(|e| format!("{} AS {}", e.expression, e.domain.name()))
            .collect();

        let mut sql = format!(
            "INSERT INTO {list} (level, kind, book_count, root_key, {cols})\n\
             SELECT {leaf}, {book}, 1, root_key, {cols}\n\
             FROM (\n  SELECT {root_key} AS root_key,\n    {select}\n  FROM {from}",
            leaf = self.leaf_level,
            book = GroupKind::Book.id(),
            root_key = self.root_key,
            select = select_list.join(",\n    "),
            from = self.from,
        );
        if !self.where_clause.is_empty() {
            sql.push_str("\n  WHERE ");
            sql.push_str(&self.where_clause);
        }
        sql.push_str("\n)");
        if strategy == BuildStrategy::Triggers {
            // Headers are emitted by triggers, so leaves must arrive in final order.
            sql.push_str("\nORDER BY ");
            sql.push_str(sort_terms);
        }
        sql
    }

    /// One BEFORE INSERT trigger per level, innermost first, each emitting the
    /// level's header the first time a row with new group values arrives, plus
    /// an AFTER INSERT trigger that records the last leaf's group values and
    /// counts it into its headers.
    fn trigger_sql(&self, tables: &ListTables) -> String {
        let list = tables.list();
        let hdr = tables.last_header();
        let Some(innermost) = self.levels.last() else {
            return String::new();
        };

        let inner_refs: Vec<&Domain> = innermost.grouped.iter().collect();
        let mut sql = tables.create_last_header_sql(&inner_refs);
        sql.push_str(";\n");

        for plan in self.levels.iter().rev() {
            let cols = column_list(&plan.grouped);
            let matches: Vec<String> = plan
                .grouped
                .iter()
                .map(|d| format!("{0} IS new.{0}", d.name()))
                .collect();
            sql.push_str(&format!(
                "CREATE TEMP TRIGGER {list}_header_{level} BEFORE INSERT ON {list}\n\
                 FOR EACH ROW WHEN new.level = {child} AND NOT EXISTS (\n\
                   SELECT 1 FROM {hdr} WHERE {matches})\n\
                 BEGIN\n\
                   INSERT INTO {list} (level, kind, book_count, root_key, {cols})\n\
                   VALUES ({level}, {kind}, 0, new.root_key, {values});\n\
                 END;\n",
                level = plan.level,
                child = plan.level + 1,
                kind = plan.kind.id(),
                matches = matches.join(" AND "),
                values = new_values(&plan.grouped),
            ));
        }

        let open_headers: Vec<String> = self
            .levels
            .iter()
            .map(|plan| format!("SELECT max(id) FROM {list} WHERE level = {}", plan.level))
            .collect();
        sql.push_str(&format!(
            "CREATE TEMP TRIGGER {list}_leaf_seen AFTER INSERT ON {list}\n\
             FOR EACH ROW WHEN new.level = {leaf}\n\
             BEGIN\n\
               UPDATE {list} SET book_count = book_count + 1 WHERE id IN ({open});\n\
               DELETE FROM {hdr};\n\
               INSERT INTO {hdr} ({cols}) VALUES ({values});\n\
             END;\n",
            leaf = self.leaf_level,
            open = open_headers.join(" UNION ALL "),
            cols = column_list(&innermost.grouped),
            values = new_values(&innermost.grouped),
        ));
        sql
    }
}

fn column_list(domains: &[Domain]) -> String {
    let names: Vec<&str> = domains.iter().map(|d| d.name()).collect();
    names.join(", ")
}

fn new_values(domains: &[Domain]) -> String {
    let values: Vec<String> = domains.iter().map(|d| format!("new.{}", d.name())).collect();
    values.join(", ")
}

fn and(sql: &mut String, clause: &str) {
    if !sql.is_empty() {
        sql.push_str(" AND ");
    }
    sql.push_str(clause);
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Join order matters: filters and derived columns refer to these aliases.
fn from_clause(style: &Style, request: &BuildRequest) -> String {
    let mut sql = String::new();
    if non_blank(&request.bookshelf).is_some() {
        sql.push_str(
            "bookshelf sh\n  JOIN book_bookshelf bbs ON bbs.bookshelf = sh.id\n  JOIN books b ON b.id = bbs.book",
        );
    } else {
        sql.push_str("books b");
    }

    if style.has_kind(GroupKind::Loaned) {
        sql.push_str("\n  JOIN loan l ON l.book = b.id");
    }

    sql.push_str("\n  JOIN book_author ba ON ba.book = b.id");
    if !style.groups().iter().any(|g| g.wants_all_authors()) {
        sql.push_str(" AND ba.author_position = 1");
    }
    sql.push_str("\n  JOIN authors a ON a.id = ba.author");

    sql.push_str("\n  LEFT OUTER JOIN book_series bs ON bs.book = b.id");
    if !style.groups().iter().any(|g| g.wants_all_series()) {
        sql.push_str(" AND bs.series_position = 1");
    }
    sql.push_str("\n  LEFT OUTER JOIN series s ON s.id = bs.series");
    sql
}

fn where_clause(style: &Style, request: &BuildRequest, params: &mut Vec<(String, Value)>) -> String {
    let mut sql = String::new();
    if let Some(shelf) = non_blank(&request.bookshelf) {
        and(&mut sql, "sh.bookshelf = :bookshelf");
        params.push((":bookshelf".to_string(), Value::Text(shelf.to_string())));
    }
    if let Some(fragment) = non_blank(&request.author_where) {
        and(&mut sql, &format!("({fragment})"));
    }
    if let Some(fragment) = non_blank(&request.book_where) {
        and(&mut sql, &format!("({fragment})"));
    }
    if let Some(name) = non_blank(&request.loaned_to) {
        and(
            &mut sql,
            "EXISTS (SELECT 1 FROM loan lf WHERE lf.book = b.id AND lf.loaned_to = :loaned_to)",
        );
        params.push((":loaned_to".to_string(), Value::Text(name.to_string())));
    }
    if let Some(name) = non_blank(&request.series_name) {
        and(
            &mut sql,
            "EXISTS (SELECT 1 FROM book_series bsf JOIN series sf ON sf.id = bsf.series \
             WHERE bsf.book = b.id AND sf.series_name = :series_name)",
        );
        params.push((":series_name".to_string(), Value::Text(name.to_string())));
    }
    if let Some(query) = request.search_text.as_deref().and_then(fts_query) {
        and(
            &mut sql,
            "EXISTS (SELECT 1 FROM books_fts WHERE books_fts.rowid = b.id AND books_fts MATCH :search)",
        );
        params.push((":search".to_string(), Value::Text(query)));
    }
    match style.read_filter {
        ReadFilter::All => {}
        ReadFilter::Read => and(&mut sql, "b.read = 1"),
        ReadFilter::Unread => and(&mut sql, "b.read = 0"),
    }
    sql
}

/// Turn free text into an FTS prefix query: each word token must match.
pub(crate) fn fts_query(text: &str) -> Option<String> {
    let normalized: String = text.nfkc().collect();
    let tokens: Vec<String> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\"*"))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;

    fn author_series() -> Style {
        Style::with_groups(
            "test",
            [
                Group::from_kind(GroupKind::Author),
                Group::from_kind(GroupKind::Series),
            ],
        )
        .expect("style")
    }

    #[test]
    fn group_domains_accumulate_outer_to_inner() {
        let plan = BuildPlan::new(&author_series(), &[], &BuildRequest::default()).expect("plan");
        let lengths: Vec<usize> = plan.levels.iter().map(|l| l.grouped.len()).collect();
        assert!(lengths.windows(2).all(|w| w[0] <= w[1]));
        assert!(plan.levels[1]
            .grouped
            .iter()
            .any(|d| d.name() == "author_id"));
    }

    #[test]
    fn root_key_uses_outer_compound_key() {
        let plan = BuildPlan::new(&author_series(), &[], &BuildRequest::default()).expect("plan");
        assert_eq!(plan.root_key, "'a' || '/' || coalesce(a.id, '')");
    }

    #[test]
    fn case_sensitive_collation_folds_text_terms() {
        let plan = BuildPlan::new(&author_series(), &[], &BuildRequest::default()).expect("plan");
        let binary = Collation {
            name: "BINARY".to_string(),
            case_sensitive: true,
        };
        let terms = plan.sort_terms(&binary);
        assert_eq!(terms[0], "lower(author_sort) COLLATE BINARY");
        assert!(terms.contains(&"author_id".to_string()));
        assert_eq!(terms.last().map(String::as_str), Some("book"));
    }

    #[test]
    fn probe_detects_case_sensitivity() {
        let conn = Connection::open_in_memory().expect("open");
        assert!(Collation::probe(&conn, "BINARY").expect("binary").case_sensitive);
        assert!(!Collation::probe(&conn, "NOCASE").expect("nocase").case_sensitive);
        assert!(matches!(
            Collation::probe(&conn, "NOCASE; DROP TABLE books"),
            Err(BooklistError::InvalidCollation(_))
        ));
    }

    #[test]
    fn where_clause_joins_filters_with_and() {
        let mut style = author_series();
        style.read_filter = ReadFilter::Unread;
        let request = BuildRequest {
            bookshelf: Some("Fiction".to_string()),
            loaned_to: Some("  ".to_string()),
            ..BuildRequest::default()
        };
        let mut params = Vec::new();
        let sql = where_clause(&style, &request, &mut params);
        assert_eq!(sql, "sh.bookshelf = :bookshelf AND b.read = 0");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn fts_query_keeps_word_tokens() {
        assert_eq!(
            fts_query("  Hitch-hiker's   guide ").as_deref(),
            Some("\"Hitch\"* \"hiker\"* \"s\"* \"guide\"*")
        );
        assert_eq!(fts_query("\"*()"), None);
        // Full-width letters normalize to ASCII.
        assert_eq!(fts_query("ＡＢＣ").as_deref(), Some("\"ABC\"*"));
    }

    #[test]
    fn primary_author_only_unless_requested() {
        let request = BuildRequest::default();
        assert!(from_clause(&author_series(), &request).contains("ba.author_position = 1"));
        let all = Style::with_groups(
            "all",
            [Group::Author {
                all_authors: true,
                given_name_first: false,
            }],
        )
        .expect("style");
        assert!(!from_clause(&all, &request).contains("ba.author_position = 1"));
    }
}
