use crate::database::{BooklistError, Result};
use crate::group::GroupColumn;
use crate::schema::{Domain, RESERVED_COLUMNS};
use super::sql::is_identifier;

/// A derived column registered for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DomainDetails {
    pub domain: Domain,
    pub expression: String,
    pub grouped: bool,
    pub sorted: bool,
}

/// Insertion-ordered set of derived columns.
///
/// A domain may be required several times (by a group and again by the leaf
/// columns, say) as long as every registration uses the same expression and
/// column type; the flags are merged. Anything else is a configuration error.
#[derive(Debug, Default, Clone)]
pub(crate) struct DomainRegistry {
    entries: Vec<DomainDetails>,
}

impl DomainRegistry {
    pub fn require_column(&mut self, column: &GroupColumn) -> Result<()> {
        self.upsert(&column.domain, &column.expression, column.grouped, column.sorted)
    }

    pub fn require(&mut self, domain: &Domain, expression: &str, sorted: bool) -> Result<()> {
        self.upsert(domain, expression, false, sorted)
    }

    pub fn get(&self, name: &str) -> Option<&DomainDetails> {
        self.entries.iter().find(|e| e.domain.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainDetails> {
        self.entries.iter()
    }

    pub fn domains(&self) -> Vec<&Domain> {
        self.entries.iter().map(|e| &e.domain).collect()
    }

    fn upsert(&mut self, domain: &Domain, expression: &str, grouped: bool, sorted: bool) -> Result<()> {
        check_name(domain.name())?;
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.domain.name() == domain.name())
        {
            if existing.expression != expression || existing.domain.column_type() != domain.column_type() {
                return Err(BooklistError::DomainConflict {
                    name: domain.name().to_string(),
                    existing: existing.expression.clone(),
                    requested: expression.to_string(),
                });
            }
            existing.grouped |= grouped;
            existing.sorted |= sorted;
            return Ok(());
        }
        self.entries.push(DomainDetails {
            domain: domain.clone(),
            expression: expression.to_string(),
            grouped,
            sorted,
        });
        Ok(())
    }
}

fn check_name(name: &str) -> Result<()> {
    if RESERVED_COLUMNS.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(BooklistError::ReservedDomain(name.to_string()));
    }
    if !is_identifier(name) {
        return Err(BooklistError::InvalidDomainName(name.to_string()));
    }
    Ok(())
}
