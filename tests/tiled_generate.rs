use std::collections::BTreeSet;

use mesh_loom::tiling::tiled;
use mesh_loom::tree::{Node, Value};

fn no_reorder() -> Node {
    let mut options = Node::new();
    options.fetch_mut("reorder").set(0i64);
    options
}

fn label_counts(res: &Node) -> [usize; 6] {
    let labels = res
        .fetch("fields/boundary_type/values")
        .and_then(Node::to_i64_vec)
        .unwrap_or_default();
    let mut counts = [0usize; 6];
    for l in labels {
        counts[l as usize] += 1;
    }
    counts
}

#[test]
fn single_tile_2d_mesh() {
    let mut res = Node::new();
    tiled(1, 1, 0, &mut res, &no_reorder()).unwrap();

    assert_eq!(
        res.fetch_f64_vec("coordsets/coords/values/x").unwrap().len(),
        33
    );
    assert!(res.fetch("coordsets/coords/values/z").is_none());
    assert_eq!(res.fetch_str("topologies/mesh/elements/shape").unwrap(), "quad");
    assert_eq!(
        res.fetch_i64_vec("topologies/mesh/elements/sizes").unwrap().len(),
        24
    );

    // 5 points per side gives 4 segments per side.
    assert_eq!(
        res.fetch_str("topologies/boundary/elements/shape").unwrap(),
        "line"
    );
    assert_eq!(
        res.fetch_i64_vec("topologies/boundary/elements/sizes")
            .unwrap()
            .len(),
        16
    );
    assert_eq!(label_counts(&res), [4, 4, 4, 4, 0, 0]);
    assert_eq!(
        res.fetch_str("fields/boundary_type/association").unwrap(),
        "element"
    );
}

#[test]
fn two_tiles_share_their_seam() {
    let mut res = Node::new();
    tiled(2, 1, 0, &mut res, &no_reorder()).unwrap();

    let xs = res.fetch_f64_vec("coordsets/coords/values/x").unwrap();
    // 33 + (33 - 5) shared seam points.
    assert_eq!(xs.len(), 61);
    // The seam column exists exactly once.
    let on_seam = xs.iter().filter(|&&x| (x - 20.0).abs() < 1e-9).count();
    assert_eq!(on_seam, 5);
    assert_eq!(
        res.fetch_i64_vec("topologies/mesh/elements/sizes").unwrap().len(),
        48
    );
}

#[test]
fn no_two_points_coincide() {
    for (nx, ny) in [(1usize, 1usize), (2, 1), (3, 2)] {
        let mut res = Node::new();
        tiled(nx, ny, 0, &mut res, &no_reorder()).unwrap();
        let xs = res.fetch_f64_vec("coordsets/coords/values/x").unwrap();
        let ys = res.fetch_f64_vec("coordsets/coords/values/y").unwrap();
        let quantized: BTreeSet<(i64, i64)> = xs
            .iter()
            .zip(ys.iter())
            .map(|(&x, &y)| ((x * 1e6).round() as i64, (y * 1e6).round() as i64))
            .collect();
        assert_eq!(quantized.len(), xs.len(), "duplicate point in {nx}x{ny}");
    }
}

#[test]
fn single_tile_3d_mesh() {
    let mut res = Node::new();
    tiled(1, 1, 1, &mut res, &no_reorder()).unwrap();

    assert_eq!(
        res.fetch_f64_vec("coordsets/coords/values/x").unwrap().len(),
        66
    );
    assert_eq!(
        res.fetch_f64_vec("coordsets/coords/values/z").unwrap().len(),
        66
    );
    assert_eq!(res.fetch_str("topologies/mesh/elements/shape").unwrap(), "hex");
    let sizes = res.fetch_i64_vec("topologies/mesh/elements/sizes").unwrap();
    assert_eq!(sizes.len(), 24);
    assert!(sizes.iter().all(|&s| s == 8));

    assert_eq!(
        res.fetch_str("topologies/boundary/elements/shape").unwrap(),
        "quad"
    );
    assert_eq!(label_counts(&res), [4, 4, 4, 4, 24, 24]);
    assert_eq!(
        res.fetch_i64_vec("topologies/boundary/elements/sizes")
            .unwrap()
            .len(),
        64
    );
}

#[test]
fn boundary_orientation_keeps_exterior_to_the_right() {
    let (nx, ny) = (2usize, 1usize);
    let mut res = Node::new();
    tiled(nx, ny, 0, &mut res, &no_reorder()).unwrap();

    let xs = res.fetch_f64_vec("coordsets/coords/values/x").unwrap();
    let ys = res.fetch_f64_vec("coordsets/coords/values/y").unwrap();
    let conn = res
        .fetch_i64_vec("topologies/boundary/elements/connectivity")
        .unwrap();
    let (x1, y1) = (20.0 * nx as f64, 20.0 * ny as f64);

    for seg in conn.chunks_exact(2) {
        let (a, b) = (seg[0] as usize, seg[1] as usize);
        let mid = ((xs[a] + xs[b]) / 2.0, (ys[a] + ys[b]) / 2.0);
        let dir = (xs[b] - xs[a], ys[b] - ys[a]);
        let len = (dir.0 * dir.0 + dir.1 * dir.1).sqrt();
        // Outward normal is to the right of the traversal direction.
        let probe = (
            mid.0 + 0.001 * dir.1 / len,
            mid.1 - 0.001 * dir.0 / len,
        );
        let outside = probe.0 < 0.0 || probe.0 > x1 || probe.1 < 0.0 || probe.1 > y1;
        assert!(outside, "segment ({a},{b}) has the exterior on its left");
    }
}

#[test]
fn reorder_preserves_mesh_content() {
    let mut plain = Node::new();
    tiled(2, 2, 0, &mut plain, &no_reorder()).unwrap();
    let mut reordered = Node::new();
    tiled(2, 2, 0, &mut reordered, &Node::new()).unwrap();

    let npts = plain.fetch_f64_vec("coordsets/coords/values/x").unwrap().len();
    assert_eq!(
        reordered
            .fetch_f64_vec("coordsets/coords/values/x")
            .unwrap()
            .len(),
        npts
    );
    assert_eq!(
        reordered
            .fetch_i64_vec("topologies/mesh/elements/sizes")
            .unwrap()
            .len(),
        plain
            .fetch_i64_vec("topologies/mesh/elements/sizes")
            .unwrap()
            .len()
    );
    assert_eq!(label_counts(&reordered), label_counts(&plain));

    // Boundary segments cover the same physical edges in both runs.
    let midpoints = |res: &Node| -> BTreeSet<(i64, i64, i64)> {
        let xs = res.fetch_f64_vec("coordsets/coords/values/x").unwrap();
        let ys = res.fetch_f64_vec("coordsets/coords/values/y").unwrap();
        let conn = res
            .fetch_i64_vec("topologies/boundary/elements/connectivity")
            .unwrap();
        let labels = res
            .fetch_i64_vec("fields/boundary_type/values")
            .unwrap();
        conn.chunks_exact(2)
            .zip(labels.iter())
            .map(|(seg, &label)| {
                let (a, b) = (seg[0] as usize, seg[1] as usize);
                (
                    ((xs[a] + xs[b]) * 0.5 * 1e6).round() as i64,
                    ((ys[a] + ys[b]) * 0.5 * 1e6).round() as i64,
                    label,
                )
            })
            .collect()
    };
    assert_eq!(midpoints(&reordered), midpoints(&plain));

    // Reordered boundary ids must still be valid points.
    let conn = reordered
        .fetch_i64_vec("topologies/boundary/elements/connectivity")
        .unwrap();
    assert!(conn.iter().all(|&p| (p as usize) < npts));
}

#[test]
fn extents_override_the_tile_size() {
    let mut options = no_reorder();
    options
        .fetch_mut("extents")
        .set(vec![0.0, 1.0, 0.0, 2.0, 0.0, 0.0]);
    let mut res = Node::new();
    tiled(1, 1, 0, &mut res, &options).unwrap();
    let xs = res.fetch_f64_vec("coordsets/coords/values/x").unwrap();
    let ys = res.fetch_f64_vec("coordsets/coords/values/y").unwrap();
    let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert!((max_x - 1.0).abs() < 1e-12);
    assert!((max_y - 2.0).abs() < 1e-12);
}

#[test]
fn int32_datatype_switches_connectivity_storage() {
    let mut options = no_reorder();
    options.fetch_mut("datatype").set("int32");
    let mut res = Node::new();
    tiled(1, 1, 0, &mut res, &options).unwrap();
    assert!(matches!(
        res.fetch("topologies/mesh/elements/connectivity")
            .unwrap()
            .value(),
        Value::Int32(_)
    ));
    assert!(matches!(
        res.fetch("topologies/boundary/elements/connectivity")
            .unwrap()
            .value(),
        Value::Int32(_)
    ));
}

#[test]
fn interior_faces_are_suppressed_in_a_domain_tiling() {
    let mut options = no_reorder();
    options.fetch_mut("domain").set(vec![1i64, 0, 0]);
    options.fetch_mut("domains").set(vec![2i64, 1, 1]);
    let mut res = Node::new();
    tiled(1, 1, 0, &mut res, &options).unwrap();

    // The left face touches the neighboring brick, so it stays silent.
    let counts = label_counts(&res);
    assert_eq!(counts[0], 0);
    assert_eq!(counts[1], 4);
    assert_eq!(counts[2], 4);
    assert_eq!(counts[3], 4);

    // The brick origin is shifted by one domain width.
    let xs = res.fetch_f64_vec("coordsets/coords/values/x").unwrap();
    let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!((min_x - 20.0).abs() < 1e-12);
}

#[test]
fn replacement_tile_pattern_is_honored() {
    let mut options = no_reorder();
    let tile = options.fetch_mut("tile");
    tile.fetch_mut("x").set(vec![0.0, 1.0, 0.0, 1.0]);
    tile.fetch_mut("y").set(vec![0.0, 0.0, 1.0, 1.0]);
    tile.fetch_mut("quads").set(vec![0i64, 1, 3, 2]);
    tile.fetch_mut("left").set(vec![0i64, 2]);
    tile.fetch_mut("right").set(vec![1i64, 3]);
    tile.fetch_mut("bottom").set(vec![0i64, 1]);
    tile.fetch_mut("top").set(vec![2i64, 3]);

    let mut res = Node::new();
    tiled(3, 3, 0, &mut res, &options).unwrap();
    // A unit-quad pattern tiles into a (3+1)^2 lattice of points.
    assert_eq!(
        res.fetch_f64_vec("coordsets/coords/values/x").unwrap().len(),
        16
    );
    assert_eq!(
        res.fetch_i64_vec("topologies/mesh/elements/sizes").unwrap().len(),
        9
    );
}

#[test]
fn invalid_replacement_pattern_is_rejected() {
    let mut options = no_reorder();
    let tile = options.fetch_mut("tile");
    tile.fetch_mut("x").set(vec![0.0, 1.0]);
    tile.fetch_mut("y").set(vec![0.0, 0.0]);
    tile.fetch_mut("quads").set(vec![0i64, 1, 9, 9]);
    tile.fetch_mut("left").set(vec![0i64]);
    tile.fetch_mut("right").set(vec![1i64]);
    tile.fetch_mut("bottom").set(vec![0i64]);
    tile.fetch_mut("top").set(vec![1i64]);
    let mut res = Node::new();
    assert!(matches!(
        tiled(1, 1, 0, &mut res, &options),
        Err(mesh_loom::mesh_error::MeshLoomError::InvalidPattern(_))
    ));
}
