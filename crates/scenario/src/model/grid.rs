use std::fmt;

use thiserror::Error;

pub const MAX_GRID_WIDTH: u32 = 1024;
pub const MAX_GRID_HEIGHT: u32 = 1024;

/// Per-cell content the packer can work with: value equality plus a
/// canonical empty state used to mark cells as consumed.
pub trait CellContent: PartialEq {
    fn is_empty(&self) -> bool;
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("cell count mismatch: expected {expected}, got {actual}")]
    CellCountMismatch { expected: usize, actual: usize },
    #[error("grid {width}x{height} exceeds maximum {max_width}x{max_height}")]
    GridTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },
    #[error("rect {rect} exceeds grid {width}x{height}")]
    RectOutOfBounds { rect: Rect, width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid<C> {
    width: u32,
    height: u32,
    cells: Vec<C>,
}

impl<C> Grid<C> {
    pub fn new(width: u32, height: u32, cells: Vec<C>) -> Result<Self, GridError> {
        if width > MAX_GRID_WIDTH || height > MAX_GRID_HEIGHT {
            return Err(GridError::GridTooLarge {
                width,
                height,
                max_width: MAX_GRID_WIDTH,
                max_height: MAX_GRID_HEIGHT,
            });
        }
        let expected = width as usize * height as usize;
        let actual = cells.len();
        if expected != actual {
            return Err(GridError::CellCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn filled(width: u32, height: u32) -> Result<Self, GridError>
    where
        C: Default + Clone,
    {
        let expected = width as usize * height as usize;
        Self::new(width, height, vec![C::default(); expected])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn cell_at(&self, x: u32, y: u32) -> Option<&C> {
        self.index_of(x, y).and_then(|index| self.cells.get(index))
    }

    pub fn cell_at_mut(&mut self, x: u32, y: u32) -> Option<&mut C> {
        self.index_of(x, y)
            .and_then(|index| self.cells.get_mut(index))
    }

    pub fn cells(&self) -> &[C] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<C> {
        self.cells
    }
}

/// Greedy rectangle packing, row-major with x fastest. Each run extends
/// rightward cell by cell, then downward whole rows at a time; consumed
/// cells are cleared so they are never revisited, which leaves the grid
/// empty afterwards. Bounding rectangles with equal content are merged into
/// one record. The fixed scan order makes the output deterministic.
pub fn pack_cells<C>(grid: &mut Grid<C>) -> Vec<(C, Vec<Rect>)>
where
    C: CellContent + Clone,
{
    let mut records: Vec<(C, Vec<Rect>)> = Vec::new();

    for y in 0..grid.height() {
        for x in 0..grid.width() {
            let content = match grid.cell_at(x, y) {
                Some(cell) if !cell.is_empty() => cell.clone(),
                _ => continue,
            };
            clear_cell(grid, x, y);

            let mut run_width = 1;
            while cell_equals(grid, x + run_width, y, &content) {
                clear_cell(grid, x + run_width, y);
                run_width += 1;
            }

            // Whole rows only; the first row with any differing cell stops
            // the downward extension.
            let mut run_height = 1;
            while row_equals(grid, x, run_width, y + run_height, &content) {
                for column in x..x + run_width {
                    clear_cell(grid, column, y + run_height);
                }
                run_height += 1;
            }

            let rect = Rect {
                x,
                y,
                width: run_width,
                height: run_height,
            };
            match records.iter_mut().find(|(existing, _)| *existing == content) {
                Some((_, rects)) => rects.push(rect),
                None => records.push((content, vec![rect])),
            }
        }
    }

    records
}

/// Inverse of `pack_cells`: stamps every record's content over its
/// rectangles. Later rectangles overwrite earlier ones, which cannot happen
/// for packer output since its rectangles never overlap.
pub fn unpack_cells<C>(
    width: u32,
    height: u32,
    records: &[(C, Vec<Rect>)],
) -> Result<Grid<C>, GridError>
where
    C: CellContent + Clone + Default,
{
    let mut grid = Grid::filled(width, height)?;
    for (content, rects) in records {
        for rect in rects {
            if !rect_in_bounds(*rect, grid.width(), grid.height()) {
                return Err(GridError::RectOutOfBounds {
                    rect: *rect,
                    width: grid.width(),
                    height: grid.height(),
                });
            }
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    if let Some(cell) = grid.cell_at_mut(x, y) {
                        *cell = content.clone();
                    }
                }
            }
        }
    }
    Ok(grid)
}

pub fn rect_in_bounds(rect: Rect, width: u32, height: u32) -> bool {
    rect.x as u64 + rect.width as u64 <= width as u64
        && rect.y as u64 + rect.height as u64 <= height as u64
}

fn cell_equals<C: CellContent>(grid: &Grid<C>, x: u32, y: u32, content: &C) -> bool {
    grid.cell_at(x, y).is_some_and(|cell| cell == content)
}

fn row_equals<C: CellContent>(grid: &Grid<C>, x: u32, width: u32, y: u32, content: &C) -> bool {
    if y >= grid.height() {
        return false;
    }
    (x..x + width).all(|column| cell_equals(grid, column, y, content))
}

fn clear_cell<C: CellContent>(grid: &mut Grid<C>, x: u32, y: u32) {
    if let Some(cell) = grid.cell_at_mut(x, y) {
        cell.clear();
    }
}
