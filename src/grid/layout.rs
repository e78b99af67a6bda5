//! Grid geometry
//!
//! Orders are 0-indexed; rows and columns are 1-indexed for display.

use serde::Serialize;

/// 1-indexed row and column of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridPosition {
    pub row: u32,
    pub column: u32,
}

impl GridPosition {
    /// Position of `order` in a grid of `columns`
    pub fn of(order: u32, columns: u32) -> Self {
        let columns = columns.max(1);
        Self {
            row: order / columns + 1,
            column: order % columns + 1,
        }
    }

    pub fn order(&self, columns: u32) -> u32 {
        (self.row - 1) * columns.max(1) + (self.column - 1)
    }
}

/// Rows and slots needed to show every item plus requested extra rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridLayout {
    pub columns: u32,
    pub total_rows: u32,
    pub total_slots: u32,
}

impl GridLayout {
    /// `max_order` is the highest occupied order, `None` for an empty list
    pub fn compute(columns: u32, max_order: Option<u32>, additional_rows: u32) -> Self {
        let columns = columns.max(1);
        let needed_rows = match max_order {
            Some(max) => (max + 1).div_ceil(columns),
            None => 1,
        };
        let total_rows = needed_rows + additional_rows;
        Self {
            columns,
            total_rows,
            total_slots: total_rows * columns,
        }
    }

    pub fn position(&self, order: u32) -> GridPosition {
        GridPosition::of(order, self.columns)
    }

    /// Every slot order, row-major
    pub fn orders(&self) -> impl Iterator<Item = u32> {
        0..self.total_slots
    }
}
