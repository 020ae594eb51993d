//! Fully-qualified table identifiers

use crate::warehouse::error::WarehouseError;
use std::fmt;
use std::str::FromStr;

/// A `project.dataset.table` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId {
    /// Project owning the dataset
    pub project: String,

    /// Dataset holding the table
    pub dataset: String,

    /// Table or view name
    pub table: String,
}

impl TableId {
    /// Create a table id from its parts
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// The id quoted for use in standard SQL
    pub fn quoted(&self) -> String {
        format!("`{}`", self)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl FromStr for TableId {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim_matches('`').split('.').collect();
        match parts.as_slice() {
            [project, dataset, table]
                if !project.is_empty() && !dataset.is_empty() && !table.is_empty() =>
            {
                Ok(Self::new(*project, *dataset, *table))
            }
            _ => Err(WarehouseError::InvalidTableId(s.to_string())),
        }
    }
}
