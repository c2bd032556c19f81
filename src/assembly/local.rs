use crate::matrix::MatrixEntry;
use crate::Real;
use nalgebra::DMatrix;

/// The pair of element sides a local block couples.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Coupling {
    ElementElement,
    ElementNeighbor,
    NeighborElement,
    NeighborNeighbor,
}

/// Local Jacobian contributions of the element currently being evaluated.
///
/// Element/element entries stay with the element and are cached until the next batch flush.
/// Entries coupling the element to a neighbor are kept apart, since they are flushed as soon as
/// the internal face is done.
#[derive(Debug, Clone)]
pub struct LocalJacobian<T> {
    element: Vec<MatrixEntry<T>>,
    neighbor: Vec<MatrixEntry<T>>,
}

impl<T> Default for LocalJacobian<T> {
    fn default() -> Self {
        Self {
            element: Vec::new(),
            neighbor: Vec::new(),
        }
    }
}

impl<T: Real> LocalJacobian<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dense block with the given global row and column indices.
    ///
    /// # Panics
    ///
    /// Panics if the block dimensions do not match the number of rows and columns.
    pub fn add_block(&mut self, coupling: Coupling, rows: &[usize], cols: &[usize], block: &DMatrix<T>) {
        assert_eq!(block.nrows(), rows.len(), "Block rows must match row indices");
        assert_eq!(block.ncols(), cols.len(), "Block columns must match column indices");

        let target = match coupling {
            Coupling::ElementElement => &mut self.element,
            _ => &mut self.neighbor,
        };
        for (i, &row) in rows.iter().enumerate() {
            for (j, &col) in cols.iter().enumerate() {
                target.push((row, col, block[(i, j)]));
            }
        }
    }

    pub fn add_element_block(&mut self, rows: &[usize], cols: &[usize], block: &DMatrix<T>) {
        self.add_block(Coupling::ElementElement, rows, cols, block)
    }

    pub fn element_entries(&self) -> &[MatrixEntry<T>] {
        &self.element
    }

    pub fn neighbor_entries(&self) -> &[MatrixEntry<T>] {
        &self.neighbor
    }

    pub(crate) fn drain_element_into(&mut self, output: &mut Vec<MatrixEntry<T>>) {
        output.append(&mut self.element);
    }

    pub(crate) fn clear_neighbor(&mut self) {
        self.neighbor.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.element.is_empty() && self.neighbor.is_empty()
    }
}
