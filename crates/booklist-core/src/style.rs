use crate::database::{BooklistError, Result};
use crate::group::{Group, GroupKind};
use serde::{Deserialize, Serialize};

/// Version written by [`Style::to_json`].
pub const STYLE_SCHEMA_VERSION: u32 = 1;

/// Book-level read/unread filter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFilter {
    #[default]
    All,
    Read,
    Unread,
}

/// Ordered grouping levels plus book-level filters.
///
/// Level 1 is `groups()[0]`, the outermost group. The leaf level
/// (`len() + 1`) is always the implicit book row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    schema_version: u32,
    pub name: String,
    groups: Vec<Group>,
    #[serde(default)]
    pub read_filter: ReadFilter,
}

impl Style {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema_version: STYLE_SCHEMA_VERSION,
            name: name.into(),
            groups: Vec::new(),
            read_filter: ReadFilter::All,
        }
    }

    /// Build a style from groups, outermost first.
    pub fn with_groups(name: impl Into<String>, groups: impl IntoIterator<Item = Group>) -> Result<Self> {
        let mut style = Self::new(name);
        for group in groups {
            style.add_group(group)?;
        }
        Ok(style)
    }

    /// Append a level below the existing ones.
    pub fn add_group(&mut self, group: Group) -> Result<()> {
        if group.kind() == GroupKind::Book {
            return Err(BooklistError::UnsupportedGroupKind(GroupKind::Book));
        }
        if self.groups.iter().any(|g| g.kind() == group.kind()) {
            return Err(BooklistError::DuplicateGroup(group.kind()));
        }
        self.groups.push(group);
        Ok(())
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Number of non-leaf levels.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// 1-based level of the book rows.
    pub fn leaf_level(&self) -> i64 {
        self.groups.len() as i64 + 1
    }

    pub fn outer_group(&self) -> Option<&Group> {
        self.groups.first()
    }

    pub fn has_kind(&self, kind: GroupKind) -> bool {
        self.groups.iter().any(|g| g.kind() == kind)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(BooklistError::EmptyStyle);
        }
        for (idx, group) in self.groups.iter().enumerate() {
            if group.kind() == GroupKind::Book {
                return Err(BooklistError::UnsupportedGroupKind(GroupKind::Book));
            }
            if self.groups[..idx].iter().any(|g| g.kind() == group.kind()) {
                return Err(BooklistError::DuplicateGroup(group.kind()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a persisted style, rejecting schema versions this crate does not
    /// know how to read.
    pub fn from_json(json: &str) -> Result<Self> {
        let style: Style = serde_json::from_str(json)?;
        if style.schema_version != STYLE_SCHEMA_VERSION {
            return Err(BooklistError::UnsupportedStyleVersion(style.schema_version));
        }
        style.validate()?;
        Ok(style)
    }
}
