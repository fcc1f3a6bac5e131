use crate::{Cell, RelError};

/// Row of a relation.
pub type Row<T> = Vec<Cell<T>>;

/// Fully revealed relation.
pub type PlainRelation = Vec<Vec<i64>>;

/// Ordered sequence of rows of the same public width.
#[derive(Clone, Debug)]
pub struct Relation<T> {
    width: usize,
    rows: Vec<Row<T>>,
}

impl<T> Relation<T> {
    /// Create relation, checking that every row has given width.
    pub fn new(width: usize, rows: Vec<Row<T>>) -> Result<Self, RelError> {
        check_widths(width, &rows)?;
        Ok(Self { width, rows })
    }

    /// Relation without rows.
    pub fn empty(width: usize) -> Self {
        Self {
            width,
            rows: Vec::new(),
        }
    }

    /// Relation of public values.
    pub fn from_plain(width: usize, rows: PlainRelation) -> Result<Self, RelError> {
        check_widths(width, &rows)?;
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Cell::Plain).collect())
            .collect();
        Ok(Self { width, rows })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row<T>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row<T>> {
        self.rows
    }
}

/// Check that all rows have given width.
pub(crate) fn check_widths<C>(width: usize, rows: &[Vec<C>]) -> Result<(), RelError> {
    match rows.iter().find(|row| row.len() != width) {
        Some(row) => Err(RelError::WidthMismatch {
            expected: width,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

/// Check that column index is valid for relation of given width.
pub(crate) fn check_column(width: usize, column: usize) -> Result<(), RelError> {
    if column < width {
        Ok(())
    } else {
        Err(RelError::ColumnOutOfRange { column, width })
    }
}

/// Cells of row without given column.
pub(crate) fn without_column<T: Copy>(row: &[T], column: usize) -> impl Iterator<Item = T> + '_ {
    row.iter()
        .enumerate()
        .filter(move |(idx, _)| *idx != column)
        .map(|(_, cell)| *cell)
}
