//! Fuse coincident vertices across coordinate sets.
//!
//! Points are quantized onto an integer lattice whose pitch comes from the
//! caller's tolerance; two points are coincident iff their quantized keys
//! are equal. Records live in an ordered map keyed by the quantized
//! 3-tuple, so output order is the sorted key order and identical inputs
//! always produce identical output.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::mesh_error::MeshLoomError;
use crate::tree::Node;

/// Coordinate systems recognized by axis names.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoordSystem {
    /// Axes `x`, `y`, `z` (missing axes default to zero).
    Cartesian,
    /// Axes `r`, `z` (axisymmetric rz-plane).
    Cylindrical,
    /// Axes `r`, `theta`, `phi`.
    Spherical,
}

/// The original points that collapsed onto one quantized key.
#[derive(Clone, Debug, Default)]
pub struct MergeRecord {
    /// Domain index of each original point.
    pub orig_domains: Vec<usize>,
    /// Point index of each original point within its domain.
    pub orig_ids: Vec<usize>,
}

type QuantizedKey = (i64, i64, i64);

/// Decimal places assumed when the tolerance is absent or degenerate.
const DEFAULT_DECIMAL_PLACES: usize = 4;

/// Quantization scales for 0..=6 retained decimal places. Each entry is the
/// nearest power of two at or above the decimal scale.
const SCALE_LOOKUP: [f64; 7] = [
    1.0,
    (2u64 << 4) as f64,
    (2u64 << 7) as f64,
    (2u64 << 10) as f64,
    (2u64 << 14) as f64,
    (2u64 << 17) as f64,
    (2u64 << 20) as f64,
];

/// Merges coincident points from many coordinate sets into one.
///
/// After [`execute`](PointMerge::execute) the merger retains the
/// original→merged index map: [`merged_id`](PointMerge::merged_id) answers
/// where an input `(domain, point)` landed in the output.
#[derive(Debug, Default)]
pub struct PointMerge {
    records: BTreeMap<QuantizedKey, MergeRecord>,
    merged: HashMap<(usize, usize), usize>,
    scale: f64,
    out_system: Option<CoordSystem>,
}

impl PointMerge {
    /// Create an empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `coordsets` under `tolerance` and return the fused coordset
    /// tree (`coordsets/coords` with explicit values).
    ///
    /// Each input is a coordset node holding explicit `values`. The output
    /// system is Cartesian unless every input shares one non-Cartesian
    /// system, which is then preserved. A set with no recognized axis names
    /// is skipped with a diagnostic.
    pub fn execute(
        &mut self,
        coordsets: &[&Node],
        tolerance: f64,
    ) -> Result<Node, MeshLoomError> {
        self.records.clear();
        self.merged.clear();
        self.scale = Self::determine_scale(tolerance);

        let detected: Vec<Option<CoordSystem>> = coordsets
            .iter()
            .map(|cs| cs.fetch("values").and_then(Self::detect_system))
            .collect();

        // Cartesian output unless every input shares a non-Cartesian system.
        let mut shared = None;
        let mut uniform = true;
        for sys in detected.iter().flatten() {
            match shared {
                None => shared = Some(*sys),
                Some(s) if s != *sys => uniform = false,
                _ => {}
            }
        }
        let out_system = match shared {
            Some(s) if uniform => s,
            _ => CoordSystem::Cartesian,
        };
        self.out_system = Some(out_system);

        for (domain_id, (coordset, sys)) in coordsets.iter().zip(detected.iter()).enumerate() {
            let Some(sys) = *sys else {
                log::warn!("coordinate set {domain_id} has no recognized axes; skipping");
                continue;
            };
            let values = coordset.fetch_existing("values")?;
            self.iterate_coordinates(domain_id, sys, out_system, values)?;
        }

        // Freeze the original->merged map in record order.
        for (i, rec) in self.records.values().enumerate() {
            for (&dom, &id) in rec.orig_domains.iter().zip(rec.orig_ids.iter()) {
                self.merged.insert((dom, id), i);
            }
        }

        let npoints = self.records.len();
        let mut xs = Vec::with_capacity(npoints);
        let mut ys = Vec::with_capacity(npoints);
        let mut zs = Vec::with_capacity(npoints);
        for key in self.records.keys() {
            xs.push(key.0 as f64 / self.scale);
            ys.push(key.1 as f64 / self.scale);
            zs.push(key.2 as f64 / self.scale);
        }

        let mut output = Node::new();
        let coords = output.fetch_mut("coordsets/coords");
        coords.fetch_mut("type").set("explicit");
        let (a0, a1, a2) = Self::axis_names(out_system);
        let values = coords.fetch_mut("values");
        values.fetch_mut(a0).set(xs);
        values.fetch_mut(a1).set(ys);
        if let Some(a2) = a2 {
            values.fetch_mut(a2).set(zs);
        }
        Ok(output)
    }

    /// The merged point id an input `(domain, point)` collapsed onto.
    pub fn merged_id(&self, domain: usize, point: usize) -> Option<usize> {
        self.merged.get(&(domain, point)).copied()
    }

    /// Number of merged output points.
    pub fn num_points(&self) -> usize {
        self.records.len()
    }

    /// Iterate records in output order.
    pub fn records(&self) -> impl Iterator<Item = &MergeRecord> {
        self.records.values()
    }

    /// The quantization scale chosen for the last `execute`.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The output coordinate system chosen by the last `execute`.
    pub fn out_system(&self) -> Option<CoordSystem> {
        self.out_system
    }

    fn axis_names(system: CoordSystem) -> (&'static str, &'static str, Option<&'static str>) {
        match system {
            CoordSystem::Cartesian => ("x", "y", Some("z")),
            CoordSystem::Cylindrical => ("r", "z", None),
            CoordSystem::Spherical => ("r", "theta", Some("phi")),
        }
    }

    fn determine_scale(tolerance: f64) -> f64 {
        let places = if tolerance.is_finite() && tolerance > 0.0 {
            (-tolerance.log10()).round().clamp(0.0, 6.0) as usize
        } else {
            DEFAULT_DECIMAL_PLACES
        };
        SCALE_LOOKUP[places.min(SCALE_LOOKUP.len() - 1)]
    }

    fn detect_system(values: &Node) -> Option<CoordSystem> {
        if values.has_path("x") {
            Some(CoordSystem::Cartesian)
        } else if values.has_path("r") {
            if values.has_path("theta") {
                Some(CoordSystem::Spherical)
            } else if values.has_path("z") {
                Some(CoordSystem::Cylindrical)
            } else {
                None
            }
        } else {
            None
        }
    }

    fn iterate_coordinates(
        &mut self,
        domain_id: usize,
        system: CoordSystem,
        out_system: CoordSystem,
        values: &Node,
    ) -> Result<(), MeshLoomError> {
        let (a0, a1, a2) = Self::axis_names(system);
        let xs = values.fetch_f64_vec(a0)?;
        let ys = values.fetch(a1).and_then(Node::to_f64_vec);
        let zs = a2.and_then(|name| values.fetch(name)).and_then(Node::to_f64_vec);
        for (i, &x) in xs.iter().enumerate() {
            let y = ys.as_ref().and_then(|v| v.get(i).copied()).unwrap_or(0.0);
            let z = zs.as_ref().and_then(|v| v.get(i).copied()).unwrap_or(0.0);
            self.insert(domain_id, i, system, out_system, x, y, z);
        }
        Ok(())
    }

    fn insert(
        &mut self,
        domain_id: usize,
        point_id: usize,
        system: CoordSystem,
        out_system: CoordSystem,
        x: f64,
        y: f64,
        z: f64,
    ) {
        let (px, py, pz) = if system == out_system {
            (x, y, z)
        } else {
            // out_system is only ever non-Cartesian when all inputs share
            // it, so a mismatch always converts into Cartesian.
            match system {
                CoordSystem::Cartesian => (x, y, z),
                CoordSystem::Cylindrical => (x, y, 0.0),
                CoordSystem::Spherical => {
                    let (r, theta, phi) = (x, y, z);
                    (
                        r * theta.sin() * phi.cos(),
                        r * theta.sin() * phi.sin(),
                        r * theta.cos(),
                    )
                }
            }
        };
        let key = (
            (px * self.scale).round() as i64,
            (py * self.scale).round() as i64,
            (pz * self.scale).round() as i64,
        );
        let rec = self.records.entry(key).or_default();
        rec.orig_domains.push(domain_id);
        rec.orig_ids.push(point_id);
    }
}
