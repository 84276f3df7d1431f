//! The tile pattern: the 2D template tessellated into a mesh.

use once_cell::sync::Lazy;

use crate::mesh_error::MeshLoomError;
use crate::tree::Node;

/// The built-in pattern, shared by every default-constructed tiler.
static DEFAULT_PATTERN: Lazy<TilePattern> = Lazy::new(TilePattern::builtin);

/// An immutable 2D template of points, quads, and edge index sequences.
///
/// Edge sequences (`left`, `right`, `bottom`, `top`) index points lying on
/// the corresponding extremal edge, ordered along that edge; opposite edges
/// have equal length so adjacent tiles can share their seam points by index
/// copy, with no floating-point comparison.
#[derive(Clone, Debug)]
pub struct TilePattern {
    xpts: Vec<f64>,
    ypts: Vec<f64>,
    quads: Vec<usize>,
    left: Vec<usize>,
    right: Vec<usize>,
    bottom: Vec<usize>,
    top: Vec<usize>,
    width: f64,
    height: f64,
}

impl Default for TilePattern {
    fn default() -> Self {
        DEFAULT_PATTERN.clone()
    }
}

impl TilePattern {
    /// The built-in 33-point composite pattern (24 quads, 5-point edges).
    fn builtin() -> Self {
        let xpts = vec![
            0., 3., 10., 17., 20., //
            0., 3., 17., 20., //
            5., 15., //
            7., 10., 13., //
            0., 7., 10., 13., 20., //
            7., 10., 13., //
            5., 15., //
            0., 3., 17., 20., //
            0., 3., 10., 17., 20.,
        ];
        let ypts = vec![
            0., 0., 0., 0., 0., //
            3., 3., 3., 3., //
            5., 5., //
            7., 7., 7., //
            10., 10., 10., 10., 10., //
            13., 13., 13., //
            15., 15., //
            17., 17., 17., 17., //
            20., 20., 20., 20., 20.,
        ];
        #[rustfmt::skip]
        let quads = vec![
            // lower-left quadrant
            0,1,6,5,
            1,2,9,6,
            2,12,11,9,
            5,6,9,14,
            9,11,15,14,
            11,12,16,15,
            // lower-right quadrant
            2,3,7,10,
            3,4,8,7,
            7,8,18,10,
            2,10,13,12,
            12,13,17,16,
            10,18,17,13,
            // upper-left quadrant
            14,22,25,24,
            14,15,19,22,
            15,16,20,19,
            24,25,29,28,
            22,30,29,25,
            19,20,30,22,
            // upper-right quadrant
            16,17,21,20,
            17,18,23,21,
            18,27,26,23,
            20,21,23,30,
            23,26,31,30,
            26,27,32,31,
        ];
        let pattern = Self {
            xpts,
            ypts,
            quads,
            left: vec![0, 5, 14, 24, 28],
            right: vec![4, 8, 18, 27, 32],
            bottom: vec![0, 1, 2, 3, 4],
            top: vec![28, 29, 30, 31, 32],
            width: 0.,
            height: 0.,
        };
        pattern.with_extents()
    }

    /// Build a pattern from a caller-provided description with children
    /// `{x, y, quads, left, right, bottom, top}`.
    pub fn from_node(t: &Node) -> Result<Self, MeshLoomError> {
        let to_indices = |path: &str| -> Result<Vec<usize>, MeshLoomError> {
            Ok(t.fetch_i64_vec(path)?
                .into_iter()
                .map(|v| v as usize)
                .collect())
        };
        let pattern = Self {
            xpts: t.fetch_f64_vec("x")?,
            ypts: t.fetch_f64_vec("y")?,
            quads: to_indices("quads")?,
            left: to_indices("left")?,
            right: to_indices("right")?,
            bottom: to_indices("bottom")?,
            top: to_indices("top")?,
            width: 0.,
            height: 0.,
        };
        pattern.validate()?;
        Ok(pattern.with_extents())
    }

    fn with_extents(mut self) -> Self {
        self.width = extent(&self.xpts);
        self.height = extent(&self.ypts);
        self
    }

    /// Check the pattern's indexing invariants.
    pub fn validate(&self) -> Result<(), MeshLoomError> {
        let invalid = |msg: String| Err(MeshLoomError::InvalidPattern(msg));
        if self.xpts.is_empty() {
            return invalid("pattern has no points".into());
        }
        if self.xpts.len() != self.ypts.len() {
            return invalid(format!(
                "x has {} points but y has {}",
                self.xpts.len(),
                self.ypts.len()
            ));
        }
        if self.quads.len() % 4 != 0 {
            return invalid(format!(
                "quads length {} is not a multiple of 4",
                self.quads.len()
            ));
        }
        let npts = self.xpts.len();
        for (name, ids) in [
            ("quads", &self.quads),
            ("left", &self.left),
            ("right", &self.right),
            ("bottom", &self.bottom),
            ("top", &self.top),
        ] {
            if let Some(&bad) = ids.iter().find(|&&i| i >= npts) {
                return invalid(format!("{name} references point {bad} of {npts}"));
            }
        }
        if self.left.len() != self.right.len() {
            return invalid(format!(
                "left has {} points but right has {}",
                self.left.len(),
                self.right.len()
            ));
        }
        if self.bottom.len() != self.top.len() {
            return invalid(format!(
                "bottom has {} points but top has {}",
                self.bottom.len(),
                self.top.len()
            ));
        }
        Ok(())
    }

    /// Number of template points.
    pub fn num_points(&self) -> usize {
        self.xpts.len()
    }

    /// Number of quads.
    pub fn num_quads(&self) -> usize {
        self.quads.len() / 4
    }

    /// Template x coordinates.
    pub fn xpts(&self) -> &[f64] {
        &self.xpts
    }

    /// Template y coordinates.
    pub fn ypts(&self) -> &[f64] {
        &self.ypts
    }

    /// Quad corner indices, 4 per quad.
    pub fn quads(&self) -> &[usize] {
        &self.quads
    }

    /// Point indices along the left edge.
    pub fn left(&self) -> &[usize] {
        &self.left
    }

    /// Point indices along the right edge.
    pub fn right(&self) -> &[usize] {
        &self.right
    }

    /// Point indices along the bottom edge.
    pub fn bottom(&self) -> &[usize] {
        &self.bottom
    }

    /// Point indices along the top edge.
    pub fn top(&self) -> &[usize] {
        &self.top
    }

    /// Coordinate extent in x.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Coordinate extent in y.
    pub fn height(&self) -> f64 {
        self.height
    }
}

fn extent(values: &[f64]) -> f64 {
    let mut lo = values[0];
    let mut hi = values[0];
    for &v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    hi - lo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_shape() {
        let p = TilePattern::default();
        assert_eq!(p.num_points(), 33);
        assert_eq!(p.num_quads(), 24);
        assert_eq!(p.left().len(), 5);
        assert_eq!(p.right().len(), 5);
        assert_eq!(p.width(), 20.0);
        assert_eq!(p.height(), 20.0);
        p.validate().unwrap();
    }

    #[test]
    fn from_node_roundtrip() {
        let mut t = Node::new();
        t.fetch_mut("x").set(vec![0.0, 1.0, 0.0, 1.0]);
        t.fetch_mut("y").set(vec![0.0, 0.0, 1.0, 1.0]);
        t.fetch_mut("quads").set(vec![0i64, 1, 3, 2]);
        t.fetch_mut("left").set(vec![0i64, 2]);
        t.fetch_mut("right").set(vec![1i64, 3]);
        t.fetch_mut("bottom").set(vec![0i64, 1]);
        t.fetch_mut("top").set(vec![2i64, 3]);
        let p = TilePattern::from_node(&t).unwrap();
        assert_eq!(p.num_points(), 4);
        assert_eq!(p.num_quads(), 1);
        assert_eq!(p.width(), 1.0);
    }

    #[test]
    fn mismatched_axes_rejected() {
        let mut t = Node::new();
        t.fetch_mut("x").set(vec![0.0, 1.0]);
        t.fetch_mut("y").set(vec![0.0]);
        for edge in ["quads", "left", "right", "bottom", "top"] {
            t.fetch_mut(edge).set(Vec::<i64>::new());
        }
        assert!(matches!(
            TilePattern::from_node(&t),
            Err(MeshLoomError::InvalidPattern(_))
        ));
    }

    #[test]
    fn out_of_range_edge_index_rejected() {
        let mut t = Node::new();
        t.fetch_mut("x").set(vec![0.0, 1.0]);
        t.fetch_mut("y").set(vec![0.0, 0.0]);
        t.fetch_mut("quads").set(Vec::<i64>::new());
        t.fetch_mut("left").set(vec![5i64]);
        t.fetch_mut("right").set(vec![1i64]);
        t.fetch_mut("bottom").set(Vec::<i64>::new());
        t.fetch_mut("top").set(Vec::<i64>::new());
        assert!(matches!(
            TilePattern::from_node(&t),
            Err(MeshLoomError::InvalidPattern(_))
        ));
    }
}
