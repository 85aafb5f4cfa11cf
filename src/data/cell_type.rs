//! The fixed set of immune cell populations counted per sample.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CellFreqError;

/// An immune cell population.
///
/// Variants are declared in ascending order of their column names so that the
/// derived `Ord` matches the textual ordering used for overview rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    BCell,
    Cd4TCell,
    Cd8TCell,
    Monocyte,
    NkCell,
}

impl CellType {
    /// Every population, in ascending column-name order.
    pub const ALL: [CellType; 5] = [
        CellType::BCell,
        CellType::Cd4TCell,
        CellType::Cd8TCell,
        CellType::Monocyte,
        CellType::NkCell,
    ];

    /// Column name of this population in the samples table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::BCell => "b_cell",
            Self::Cd4TCell => "cd4_t_cell",
            Self::Cd8TCell => "cd8_t_cell",
            Self::Monocyte => "monocyte",
            Self::NkCell => "nk_cell",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for CellType {
    type Err = CellFreqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellType::ALL
            .iter()
            .copied()
            .find(|c| c.column() == s)
            .ok_or_else(|| {
                CellFreqError::InvalidParameter(format!(
                    "Unknown cell type '{}'. Available: {:?}",
                    s,
                    CellType::ALL.iter().map(|c| c.column()).collect::<Vec<_>>()
                ))
            })
    }
}
