//! Grid layout of the mosaic canvas

use crate::backend::Rect;

/// Column widths and row heights of a subframe grid.
///
/// A column is as wide as its widest subframe and a row as tall as its
/// tallest one; empty cells contribute nothing. Row 0 starts at y = 0, the
/// bottom of the offscreen target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLayout {
    column_widths: Vec<u32>,
    row_heights: Vec<u32>,
}

impl GridLayout {
    /// Build from the size of each cell, `None` for empty cells
    pub fn from_cells(
        rows: usize,
        cols: usize,
        size_of: impl Fn(usize, usize) -> Option<(u32, u32)>,
    ) -> Self {
        let mut column_widths = vec![0; cols];
        let mut row_heights = vec![0; rows];
        for row in 0..rows {
            for col in 0..cols {
                if let Some((width, height)) = size_of(row, col) {
                    column_widths[col] = column_widths[col].max(width);
                    row_heights[row] = row_heights[row].max(height);
                }
            }
        }
        Self {
            column_widths,
            row_heights,
        }
    }

    pub fn column_widths(&self) -> &[u32] {
        &self.column_widths
    }

    pub fn row_heights(&self) -> &[u32] {
        &self.row_heights
    }

    /// Canvas width, saturating at `u32::MAX`
    pub fn width(&self) -> u32 {
        saturating_sum(&self.column_widths)
    }

    /// Canvas height, saturating at `u32::MAX`
    pub fn height(&self) -> u32 {
        saturating_sum(&self.row_heights)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Unclamped canvas size
    pub fn exact_size(&self) -> (u64, u64) {
        let sum = |values: &[u32]| values.iter().map(|&v| u64::from(v)).sum();
        (sum(&self.column_widths), sum(&self.row_heights))
    }

    /// Canvas size, or `None` when it does not fit window coordinates
    pub fn checked_size(&self) -> Option<(u32, u32)> {
        let (width, height) = self.exact_size();
        let limit = i32::MAX as u64;
        (width <= limit && height <= limit).then_some((width as u32, height as u32))
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Lower-left corner of a cell
    pub fn cell_origin(&self, row: usize, col: usize) -> (u32, u32) {
        let x = saturating_sum(self.column_widths.get(..col).unwrap_or(&self.column_widths));
        let y = saturating_sum(self.row_heights.get(..row).unwrap_or(&self.row_heights));
        (x, y)
    }

    /// Area a `width` x `height` subframe occupies in its cell
    pub fn cell_rect(&self, row: usize, col: usize, width: u32, height: u32) -> Rect {
        let (x, y) = self.cell_origin(row, col);
        Rect::new(x as i32, y as i32, width, height)
    }
}

fn saturating_sum(values: &[u32]) -> u32 {
    values.iter().fold(0, |total, &v| total.saturating_add(v))
}
