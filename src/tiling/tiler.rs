//! Tiled mesh generator.
//!
//! Tessellates a [`TilePattern`] across an `nx`×`ny` grid (extruded through
//! `nz` planes when `nz >= 1`), sharing seam points between neighboring
//! tiles by index copy, optionally reordering elements for locality, and
//! emitting explicit boundary faces labeled by brick side. Boundary
//! orientations are chosen so every emitted normal points out of the
//! logical brick `[0,nx]×[0,ny]×[0,nz]`.

use crate::algs::reorder::{reorder, set_index_vec, spatial_ordering};
use crate::mesh_error::MeshLoomError;
use crate::tiling::pattern::TilePattern;
use crate::tree::Node;

/// Side of the logical brick a boundary face lies on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Side {
    Left = 0,
    Right = 1,
    Bottom = 2,
    Top = 3,
    Back = 4,
    Front = 5,
}

impl Side {
    /// The integer label written to `fields/boundary_type`.
    #[inline]
    pub fn label(self) -> i32 {
        self as i32
    }
}

/// Sentinel for a template point that has not been materialized yet.
const INVALID_POINT: i64 = -1;

/// One pattern instance at a grid position: template point -> global id.
#[derive(Clone, Debug)]
struct Tile {
    ptids: Vec<i64>,
}

impl Tile {
    fn new(npts: usize) -> Self {
        Self {
            ptids: vec![INVALID_POINT; npts],
        }
    }

    /// Gather this tile's global ids at the supplied template indices.
    fn ids(&self, indices: &[usize]) -> Vec<i64> {
        indices.iter().map(|&i| self.ptids[i]).collect()
    }

    /// Adopt global ids (usually a neighbor's seam) at the given indices.
    fn set_ids(&mut self, indices: &[usize], ids: &[i64]) {
        for (&idx, &id) in indices.iter().zip(ids.iter()) {
            self.ptids[idx] = id;
        }
    }
}

/// Builds meshes by tiling a pattern.
#[derive(Clone, Debug, Default)]
pub struct Tiler {
    pattern: TilePattern,
}

/// Generate a tiled mesh into `res`. Convenience wrapper over [`Tiler`].
pub fn tiled(
    nx: usize,
    ny: usize,
    nz: usize,
    res: &mut Node,
    options: &Node,
) -> Result<(), MeshLoomError> {
    Tiler::new().generate(nx, ny, nz, res, options)
}

impl Tiler {
    /// A tiler with the built-in pattern.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate an `nx`×`ny`(×`nz`) mesh into `res`.
    ///
    /// Writes topology `mesh` (quads for `nz == 0`, hexes otherwise) and,
    /// where any brick face is exposed, topology `boundary` with the
    /// per-face side label in `fields/boundary_type`. See the crate docs
    /// for the recognized options.
    pub fn generate(
        &mut self,
        nx: usize,
        ny: usize,
        nz: usize,
        res: &mut Node,
        options: &Node,
    ) -> Result<(), MeshLoomError> {
        if nx == 0 || ny == 0 {
            return Err(MeshLoomError::OptionsTypeMismatch {
                option: "nx/ny".into(),
                reason: "tile counts must be at least 1".into(),
            });
        }
        if let Some(tile) = options.fetch("tile") {
            self.pattern = TilePattern::from_node(tile)?;
        }
        let reorder_enabled = match options.fetch("reorder") {
            Some(n) => {
                n.to_i64().ok_or_else(|| MeshLoomError::OptionsTypeMismatch {
                    option: "reorder".into(),
                    reason: "expected an integer".into(),
                })? > 0
            }
            None => true,
        };
        let use32 = match options.fetch("datatype") {
            Some(n) => {
                let s = n.as_str().ok_or_else(|| MeshLoomError::OptionsTypeMismatch {
                    option: "datatype".into(),
                    reason: "expected a string".into(),
                })?;
                matches!(s, "int" | "int32" | "integer")
            }
            None => false,
        };

        // Transformation from template coordinates to mesh coordinates.
        let width = self.pattern.width();
        let height = self.pattern.height();
        let mut origin = [0.0f64; 3];
        let mut tx = width;
        let mut ty = height;
        let mut z1 = width.max(height) * nz as f64;
        if let Some(ext) = options.fetch("extents") {
            let e = ext
                .to_f64_vec()
                .ok_or_else(|| MeshLoomError::OptionsTypeMismatch {
                    option: "extents".into(),
                    reason: "expected a numeric array".into(),
                })?;
            if e.len() != 6 {
                return Err(MeshLoomError::OptionsTypeMismatch {
                    option: "extents".into(),
                    reason: format!("expected 6 values, got {}", e.len()),
                });
            }
            tx = (e[1] - e[0]) / nx as f64;
            ty = (e[3] - e[2]) / ny as f64;
            origin = [e[0], e[2], e[4]];
            z1 = e[5];
        } else if let Some((domain, domains)) = parse_domains(options)? {
            let _ = domains;
            origin[0] = domain[0] as f64 * nx as f64 * width;
            origin[1] = domain[1] as f64 * ny as f64 * height;
            origin[2] = domain[2] as f64 * z1;
            z1 += origin[2];
        }
        // Row-major scale + translate; points pass through homogeneously.
        let mut m = [
            [tx / width, 0.0, 0.0],
            [0.0, ty / height, 0.0],
            [origin[0], origin[1], 1.0],
        ];

        // First pass: materialize tile points, sharing seams by index copy.
        let npts_template = self.pattern.num_points();
        let mut tiles: Vec<Tile> = Vec::with_capacity(nx * ny);
        let mut x: Vec<f64> = Vec::new();
        let mut y: Vec<f64> = Vec::new();
        for j in 0..ny {
            m[2][0] = origin[0];
            for i in 0..nx {
                let mut current = Tile::new(npts_template);
                if i > 0 {
                    let seam = tiles[j * nx + i - 1].ids(self.pattern.right());
                    current.set_ids(self.pattern.left(), &seam);
                }
                if j > 0 {
                    let seam = tiles[(j - 1) * nx + i].ids(self.pattern.top());
                    current.set_ids(self.pattern.bottom(), &seam);
                }
                self.add_points(&m, &mut current, &mut x, &mut y);
                tiles.push(current);
                m[2][0] += tx;
            }
            m[2][1] += ty;
        }

        // Second pass: emit elements.
        let mut conn: Vec<i64> = Vec::new();
        let mut sizes: Vec<i64> = Vec::new();
        let mut z: Vec<f64> = Vec::new();
        let mut pts_per_plane = 0usize;
        if nz < 1 {
            for tile in &tiles {
                self.iterate_faces(&tile.ptids, 0, false, Side::Back, &mut |ids, _| {
                    conn.extend_from_slice(ids);
                    sizes.push(ids.len() as i64);
                });
            }
            // z coordinates stay empty in 2D.
        } else {
            pts_per_plane = x.len();
            let nplanes = nz + 1;
            x.reserve(pts_per_plane * nz);
            y.reserve(pts_per_plane * nz);
            z.reserve(pts_per_plane * nplanes);
            for _ in 0..pts_per_plane {
                z.push(origin[2]);
            }
            for p in 1..nplanes {
                let t = p as f64 / (nplanes - 1) as f64;
                let zvalue = (1.0 - t) * origin[2] + t * z1;
                for i in 0..pts_per_plane {
                    x.push(x[i]);
                    y.push(y[i]);
                    z.push(zvalue);
                }
            }
            for k in 0..nz {
                let offset1 = (k * pts_per_plane) as i64;
                let offset2 = offset1 + pts_per_plane as i64;
                for tile in &tiles {
                    self.add_hexs(&tile.ptids, offset1, offset2, &mut conn, &mut sizes);
                }
            }
        }

        res.fetch_mut("coordsets/coords/type").set("explicit");
        res.fetch_mut("coordsets/coords/values/x").set(x);
        res.fetch_mut("coordsets/coords/values/y").set(y);
        let is_3d = !z.is_empty();
        if is_3d {
            res.fetch_mut("coordsets/coords/values/z").set(z);
        }

        let mesh = res.fetch_mut("topologies/mesh");
        mesh.fetch_mut("type").set("unstructured");
        mesh.fetch_mut("coordset").set("coords");
        mesh.fetch_mut("elements/shape")
            .set(if is_3d { "hex" } else { "quad" });
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut acc = 0i64;
        for &s in &sizes {
            offsets.push(acc);
            acc += s;
        }
        set_index_vec(mesh.fetch_mut("elements/connectivity"), conn, use32);
        set_index_vec(mesh.fetch_mut("elements/sizes"), sizes, use32);
        set_index_vec(mesh.fetch_mut("elements/offsets"), offsets, use32);

        // Reorder the elements unless it was turned off.
        let mut old2new: Vec<usize> = Vec::new();
        if reorder_enabled {
            let order = spatial_ordering(
                res.fetch_existing("topologies/mesh")?,
                res.fetch_existing("coordsets/coords")?,
            )?;
            old2new = reorder(res, "mesh", &order)?;
        }

        // Boundaries.
        let flags = boundary_flags(options)?;
        let mut bconn: Vec<i64> = Vec::new();
        let mut bsizes: Vec<i64> = Vec::new();
        let mut btype: Vec<i32> = Vec::new();
        {
            let mut body = |ids: &[i64], side: Side| {
                if old2new.is_empty() {
                    bconn.extend_from_slice(ids);
                } else {
                    bconn.extend(ids.iter().map(|&p| old2new[p as usize] as i64));
                }
                bsizes.push(ids.len() as i64);
                btype.push(side.label());
            };
            if nz < 1 {
                self.iterate_boundary_2d(&tiles, nx, ny, &flags, &mut body);
            } else {
                self.iterate_boundary_3d(
                    &tiles,
                    nx,
                    ny,
                    nz,
                    pts_per_plane as i64,
                    &flags,
                    &mut body,
                );
            }
        }
        if !bconn.is_empty() {
            let boundary = res.fetch_mut("topologies/boundary");
            boundary.fetch_mut("type").set("unstructured");
            boundary.fetch_mut("coordset").set("coords");
            boundary
                .fetch_mut("elements/shape")
                .set(if is_3d { "quad" } else { "line" });
            let mut boffsets = Vec::with_capacity(bsizes.len());
            let mut acc = 0i64;
            for &s in &bsizes {
                boffsets.push(acc);
                acc += s;
            }
            set_index_vec(boundary.fetch_mut("elements/connectivity"), bconn, use32);
            set_index_vec(boundary.fetch_mut("elements/sizes"), bsizes, use32);
            set_index_vec(boundary.fetch_mut("elements/offsets"), boffsets, use32);

            let field = res.fetch_mut("fields/boundary_type");
            field.fetch_mut("topology").set("boundary");
            field.fetch_mut("association").set("element");
            field.fetch_mut("values").set(btype);
        }
        Ok(())
    }

    /// Materialize this tile's still-invalid template points, assigning the
    /// next global ids and appending transformed coordinates.
    fn add_points(&self, m: &[[f64; 3]; 3], tile: &mut Tile, x: &mut Vec<f64>, y: &mut Vec<f64>) {
        let xs = self.pattern.xpts();
        let ys = self.pattern.ypts();
        for i in 0..xs.len() {
            if tile.ptids[i] == INVALID_POINT {
                tile.ptids[i] = x.len() as i64;
                // (x, y, 1) * M with homogeneous divide.
                let xc = xs[i] * m[0][0] + ys[i] * m[1][0] + m[2][0];
                let yc = xs[i] * m[0][1] + ys[i] * m[1][1] + m[2][1];
                let h = xs[i] * m[0][2] + ys[i] * m[1][2] + m[2][2];
                x.push(xc / h);
                y.push(yc / h);
            }
        }
    }

    /// Visit the tile's quads as faces, optionally reversed.
    fn iterate_faces<F>(&self, ptids: &[i64], offset: i64, reverse: bool, side: Side, body: &mut F)
    where
        F: FnMut(&[i64], Side),
    {
        let order: [usize; 4] = if reverse { [3, 2, 1, 0] } else { [0, 1, 2, 3] };
        for q in self.pattern.quads().chunks_exact(4) {
            let ids = [
                offset + ptids[q[order[0]]],
                offset + ptids[q[order[1]]],
                offset + ptids[q[order[2]]],
                offset + ptids[q[order[3]]],
            ];
            body(&ids, side);
        }
    }

    /// Emit the hexes joining this tile's quads in planes 1 and 2.
    fn add_hexs(
        &self,
        ptids: &[i64],
        plane1_offset: i64,
        plane2_offset: i64,
        conn: &mut Vec<i64>,
        sizes: &mut Vec<i64>,
    ) {
        for q in self.pattern.quads().chunks_exact(4) {
            for &qi in q {
                conn.push(plane1_offset + ptids[qi]);
            }
            for &qi in q {
                conn.push(plane2_offset + ptids[qi]);
            }
            sizes.push(8);
        }
    }

    /// Walk the enabled 2D boundary edges so the brick exterior is always
    /// to the right of the traversal: Left top-to-bottom, Bottom
    /// left-to-right, Right bottom-to-top, Top right-to-left.
    fn iterate_boundary_2d<F>(
        &self,
        tiles: &[Tile],
        nx: usize,
        ny: usize,
        flags: &[bool; 6],
        body: &mut F,
    ) where
        F: FnMut(&[i64], Side),
    {
        if flags[Side::Left as usize] {
            for j in (0..ny).rev() {
                let ids = tiles[j * nx].ids(self.pattern.left());
                for bi in (1..ids.len()).rev() {
                    body(&[ids[bi], ids[bi - 1]], Side::Left);
                }
            }
        }
        if flags[Side::Bottom as usize] {
            for i in 0..nx {
                let ids = tiles[i].ids(self.pattern.bottom());
                for bi in 0..ids.len().saturating_sub(1) {
                    body(&[ids[bi], ids[bi + 1]], Side::Bottom);
                }
            }
        }
        if flags[Side::Right as usize] {
            for j in 0..ny {
                let ids = tiles[j * nx + nx - 1].ids(self.pattern.right());
                for bi in 0..ids.len().saturating_sub(1) {
                    body(&[ids[bi], ids[bi + 1]], Side::Right);
                }
            }
        }
        if flags[Side::Top as usize] {
            for i in (0..nx).rev() {
                let ids = tiles[(ny - 1) * nx + i].ids(self.pattern.top());
                for bi in (1..ids.len()).rev() {
                    body(&[ids[bi], ids[bi - 1]], Side::Top);
                }
            }
        }
    }

    /// Walk the enabled 3D boundary faces. The four side walls extrude the
    /// 2D edge traversals through each plane pair; Back emits reversed
    /// quads at plane 0 and Front forward quads at plane `nz`.
    #[allow(clippy::too_many_arguments)]
    fn iterate_boundary_3d<F>(
        &self,
        tiles: &[Tile],
        nx: usize,
        ny: usize,
        nz: usize,
        pts_per_plane: i64,
        flags: &[bool; 6],
        body: &mut F,
    ) where
        F: FnMut(&[i64], Side),
    {
        if flags[Side::Left as usize] {
            self.boundary_wall(
                tiles,
                nz,
                pts_per_plane,
                self.pattern.left(),
                |t| (ny - 1 - t) * nx,
                ny,
                true,
                Side::Left,
                body,
            );
        }
        if flags[Side::Right as usize] {
            self.boundary_wall(
                tiles,
                nz,
                pts_per_plane,
                self.pattern.right(),
                |t| t * nx + nx - 1,
                ny,
                false,
                Side::Right,
                body,
            );
        }
        if flags[Side::Bottom as usize] {
            self.boundary_wall(
                tiles,
                nz,
                pts_per_plane,
                self.pattern.bottom(),
                |t| t,
                nx,
                false,
                Side::Bottom,
                body,
            );
        }
        if flags[Side::Top as usize] {
            self.boundary_wall(
                tiles,
                nz,
                pts_per_plane,
                self.pattern.top(),
                |t| (ny - 1) * nx + (nx - 1 - t),
                nx,
                true,
                Side::Top,
                body,
            );
        }
        if flags[Side::Back as usize] {
            for j in 0..ny {
                for i in (0..nx).rev() {
                    self.iterate_faces(&tiles[j * nx + i].ptids, 0, true, Side::Back, body);
                }
            }
        }
        if flags[Side::Front as usize] {
            for j in 0..ny {
                for i in 0..nx {
                    self.iterate_faces(
                        &tiles[j * nx + i].ptids,
                        nz as i64 * pts_per_plane,
                        false,
                        Side::Front,
                        body,
                    );
                }
            }
        }
    }

    /// Extrude one 2D edge traversal through every plane pair, emitting a
    /// side-wall quad per (plane, segment).
    #[allow(clippy::too_many_arguments)]
    fn boundary_wall<F>(
        &self,
        tiles: &[Tile],
        nz: usize,
        pts_per_plane: i64,
        edge: &[usize],
        tile_of: impl Fn(usize) -> usize,
        n: usize,
        rev: bool,
        side: Side,
        body: &mut F,
    ) where
        F: FnMut(&[i64], Side),
    {
        for k in 0..nz {
            let offset1 = k as i64 * pts_per_plane;
            let offset2 = (k as i64 + 1) * pts_per_plane;
            for t in 0..n {
                let ids = tiles[tile_of(t)].ids(edge);
                if rev {
                    for bi in (1..ids.len()).rev() {
                        body(
                            &[
                                offset1 + ids[bi],
                                offset1 + ids[bi - 1],
                                offset2 + ids[bi - 1],
                                offset2 + ids[bi],
                            ],
                            side,
                        );
                    }
                } else {
                    for bi in 0..ids.len().saturating_sub(1) {
                        body(
                            &[
                                offset1 + ids[bi],
                                offset1 + ids[bi + 1],
                                offset2 + ids[bi + 1],
                                offset2 + ids[bi],
                            ],
                            side,
                        );
                    }
                }
            }
        }
    }
}

/// Decide which of the six sides get boundary faces. With a multi-domain
/// tiling, only faces on the extremal bricks are exposed; otherwise all six.
fn boundary_flags(options: &Node) -> Result<[bool; 6], MeshLoomError> {
    if let Some((domain, domains)) = parse_domains(options)? {
        let ndoms = domains[0] * domains[1] * domains[2];
        if ndoms > 1 {
            return Ok([
                domain[0] == 0,
                domain[0] == domains[0] - 1,
                domain[1] == 0,
                domain[1] == domains[1] - 1,
                domain[2] == 0,
                domain[2] == domains[2] - 1,
            ]);
        }
    }
    Ok([true; 6])
}

/// Parse the co-occurring `domain`/`domains` 3-tuples.
fn parse_domains(options: &Node) -> Result<Option<([i64; 3], [i64; 3])>, MeshLoomError> {
    let fetch3 = |name: &str, n: &Node| -> Result<[i64; 3], MeshLoomError> {
        let v = n
            .to_i64_vec()
            .ok_or_else(|| MeshLoomError::OptionsTypeMismatch {
                option: name.into(),
                reason: "expected an integer array".into(),
            })?;
        if v.len() != 3 {
            return Err(MeshLoomError::OptionsTypeMismatch {
                option: name.into(),
                reason: format!("expected 3 values, got {}", v.len()),
            });
        }
        Ok([v[0], v[1], v[2]])
    };
    match (options.fetch("domain"), options.fetch("domains")) {
        (None, None) => Ok(None),
        (Some(d), Some(ds)) => Ok(Some((fetch3("domain", d)?, fetch3("domains", ds)?))),
        _ => Err(MeshLoomError::OptionsTypeMismatch {
            option: "domain".into(),
            reason: "domain and domains must co-occur".into(),
        }),
    }
}
