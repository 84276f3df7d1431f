//! Spatial element reordering for cache locality.
//!
//! [`spatial_ordering`] produces an element visit order by recursively
//! median-splitting element centroids along the widest axis, so elements
//! close in space end up close in the order. [`reorder`] applies such an
//! order to a topology in place: elements are renumbered, points are
//! renumbered in first-use order, coordinates and fields follow, and the
//! resulting `old2new` point map is returned so callers can translate
//! connectivity emitted against the old numbering (boundaries, adjacency).

use std::cmp::Ordering;

use crate::mesh_error::MeshLoomError;
use crate::tree::{Node, Value};

/// Compute a spatially coherent element ordering from centroids.
///
/// `topo` is an unstructured topology node (`elements/connectivity`,
/// `elements/sizes`); `coords` is its explicit coordset.
pub fn spatial_ordering(topo: &Node, coords: &Node) -> Result<Vec<usize>, MeshLoomError> {
    let conn = topo.fetch_i64_vec("elements/connectivity")?;
    let sizes = topo.fetch_i64_vec("elements/sizes")?;
    let xs = coords.fetch_f64_vec("values/x")?;
    let ys = coords.fetch_f64_vec("values/y")?;
    let zs = coords.fetch("values/z").and_then(Node::to_f64_vec);

    let mut centroids = Vec::with_capacity(sizes.len());
    let mut offset = 0usize;
    for &size in &sizes {
        let size = size as usize;
        let ids = &conn[offset..offset + size];
        let mut c = [0.0f64; 3];
        for &pt in ids {
            let p = pt as usize;
            c[0] += xs[p];
            c[1] += ys[p];
            c[2] += zs.as_ref().map_or(0.0, |z| z[p]);
        }
        let inv = 1.0 / size as f64;
        centroids.push([c[0] * inv, c[1] * inv, c[2] * inv]);
        offset += size;
    }

    let mut order = Vec::with_capacity(centroids.len());
    kd_order((0..centroids.len()).collect(), &centroids, &mut order);
    Ok(order)
}

fn kd_order(mut idx: Vec<usize>, centroids: &[[f64; 3]], out: &mut Vec<usize>) {
    if idx.len() <= 1 {
        out.extend(idx);
        return;
    }
    // Split along the widest axis of the bounding box.
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for &i in &idx {
        for a in 0..3 {
            lo[a] = lo[a].min(centroids[i][a]);
            hi[a] = hi[a].max(centroids[i][a]);
        }
    }
    let mut axis = 0;
    for a in 1..3 {
        if hi[a] - lo[a] > hi[axis] - lo[axis] {
            axis = a;
        }
    }
    idx.sort_by(|&a, &b| {
        centroids[a][axis]
            .partial_cmp(&centroids[b][axis])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    let rest = idx.split_off(idx.len() / 2);
    kd_order(idx, centroids, out);
    kd_order(rest, centroids, out);
}

/// Renumber a topology (and its coordset and fields) to `elem_order`.
///
/// Points take new ids in order of first use by the reordered elements;
/// points no element references keep their relative order after the
/// referenced ones. Returns `old2new[point]`.
pub fn reorder(
    root: &mut Node,
    topo_name: &str,
    elem_order: &[usize],
) -> Result<Vec<usize>, MeshLoomError> {
    let topo_path = format!("topologies/{topo_name}");
    let topo = root.fetch_existing(&topo_path)?;
    let coordset_name = topo.fetch_str("coordset")?.to_owned();
    let conn_node = topo.fetch_existing("elements/connectivity")?;
    let use32 = matches!(conn_node.value(), Value::Int32(_));
    let conn = topo.fetch_i64_vec("elements/connectivity")?;
    let sizes = topo.fetch_i64_vec("elements/sizes")?;
    if elem_order.len() != sizes.len() {
        return Err(MeshLoomError::Partition(format!(
            "element order has {} entries for {} elements",
            elem_order.len(),
            sizes.len()
        )));
    }

    let coords_path = format!("coordsets/{coordset_name}");
    let xs = root.fetch_f64_vec(&format!("{coords_path}/values/x"))?;
    let npoints = xs.len();

    let mut offsets = Vec::with_capacity(sizes.len());
    let mut acc = 0i64;
    for &s in &sizes {
        offsets.push(acc as usize);
        acc += s;
    }

    // Walk elements in their new order; points get ids by first use.
    let mut old2new = vec![usize::MAX; npoints];
    let mut next = 0usize;
    let mut new_conn = Vec::with_capacity(conn.len());
    let mut new_sizes = Vec::with_capacity(sizes.len());
    for &e in elem_order {
        let size = sizes[e] as usize;
        for &pt in &conn[offsets[e]..offsets[e] + size] {
            let p = pt as usize;
            if old2new[p] == usize::MAX {
                old2new[p] = next;
                next += 1;
            }
            new_conn.push(old2new[p] as i64);
        }
        new_sizes.push(size as i64);
    }
    for entry in old2new.iter_mut() {
        if *entry == usize::MAX {
            *entry = next;
            next += 1;
        }
    }

    let mut new_offsets = Vec::with_capacity(new_sizes.len());
    let mut acc = 0i64;
    for &s in &new_sizes {
        new_offsets.push(acc);
        acc += s;
    }

    let elements = root.fetch_mut(&format!("{topo_path}/elements"));
    set_index_vec(elements.fetch_mut("connectivity"), new_conn, use32);
    set_index_vec(elements.fetch_mut("sizes"), new_sizes, use32);
    set_index_vec(elements.fetch_mut("offsets"), new_offsets, use32);

    // Scatter coordinates through the point map.
    let values = root.fetch_mut(&format!("{coords_path}/values"));
    for axis in ["x", "y", "z"] {
        let Some(old) = values.fetch(axis).and_then(Node::to_f64_vec) else {
            continue;
        };
        let mut new = vec![0.0f64; old.len()];
        for (p, v) in old.into_iter().enumerate() {
            new[old2new[p]] = v;
        }
        values.fetch_mut(axis).set(new);
    }

    // Fields on this topology follow their association.
    let field_names: Vec<String> = root
        .fetch("fields")
        .map(|f| f.children().map(|(n, _)| n.to_owned()).collect())
        .unwrap_or_default();
    for name in field_names {
        let field = root.fetch_mut(&format!("fields/{name}"));
        if field.fetch("topology").and_then(Node::as_str) != Some(topo_name) {
            continue;
        }
        let assoc = field.fetch("association").and_then(Node::as_str);
        match assoc {
            Some("vertex") => scatter_values(field.fetch_mut("values"), &old2new),
            Some("element") => gather_values(field.fetch_mut("values"), elem_order),
            _ => {}
        }
    }

    Ok(old2new)
}

/// Store an index array at the requested width (i32 or the default i64).
pub(crate) fn set_index_vec(node: &mut Node, data: Vec<i64>, use32: bool) {
    if use32 {
        node.set(data.into_iter().map(|v| v as i32).collect::<Vec<i32>>());
    } else {
        node.set(data);
    }
}

/// out[map[i]] = in[i] (vertex data follows renumbered points).
fn scatter_values(node: &mut Node, map: &[usize]) {
    match node.value().clone() {
        Value::Float64(v) => {
            let mut out = vec![0.0f64; v.len()];
            for (i, &x) in v.iter().enumerate() {
                out[map[i]] = x;
            }
            node.set(out);
        }
        Value::Int64(v) => {
            let mut out = vec![0i64; v.len()];
            for (i, &x) in v.iter().enumerate() {
                out[map[i]] = x;
            }
            node.set(out);
        }
        Value::Int32(v) => {
            let mut out = vec![0i32; v.len()];
            for (i, &x) in v.iter().enumerate() {
                out[map[i]] = x;
            }
            node.set(out);
        }
        _ => {}
    }
}

/// out[i] = in[order[i]] (element data follows the new element order).
fn gather_values(node: &mut Node, order: &[usize]) {
    match node.value().clone() {
        Value::Float64(v) => {
            node.set(order.iter().map(|&e| v[e]).collect::<Vec<f64>>());
        }
        Value::Int64(v) => {
            node.set(order.iter().map(|&e| v[e]).collect::<Vec<i64>>());
        }
        Value::Int32(v) => {
            node.set(order.iter().map(|&e| v[e]).collect::<Vec<i32>>());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two unit quads side by side: points 0..6, elements [0,1,4,3], [1,2,5,4].
    fn two_quads() -> Node {
        let mut n = Node::new();
        n.fetch_mut("coordsets/coords/type").set("explicit");
        n.fetch_mut("coordsets/coords/values/x")
            .set(vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
        n.fetch_mut("coordsets/coords/values/y")
            .set(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let topo = n.fetch_mut("topologies/mesh");
        topo.fetch_mut("type").set("unstructured");
        topo.fetch_mut("coordset").set("coords");
        topo.fetch_mut("elements/shape").set("quad");
        topo.fetch_mut("elements/connectivity")
            .set(vec![0i64, 1, 4, 3, 1, 2, 5, 4]);
        topo.fetch_mut("elements/sizes").set(vec![4i64, 4]);
        topo.fetch_mut("elements/offsets").set(vec![0i64, 4]);
        n
    }

    #[test]
    fn ordering_covers_all_elements_once() {
        let n = two_quads();
        let order = spatial_ordering(
            n.fetch("topologies/mesh").unwrap(),
            n.fetch("coordsets/coords").unwrap(),
        )
        .unwrap();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1]);
    }

    #[test]
    fn reorder_renumbers_points_by_first_use() {
        let mut n = two_quads();
        let old2new = reorder(&mut n, "mesh", &[1, 0]).unwrap();
        // Element 1 comes first, so its points 1,2,5,4 claim ids 0..4.
        assert_eq!(
            n.fetch_i64_vec("topologies/mesh/elements/connectivity")
                .unwrap(),
            vec![0, 1, 2, 3, 4, 0, 3, 5]
        );
        assert_eq!(old2new[1], 0);
        assert_eq!(old2new[2], 1);
        // Coordinates follow: new point 0 is old point 1 at x=1.
        let xs = n.fetch_f64_vec("coordsets/coords/values/x").unwrap();
        assert_eq!(xs[0], 1.0);
        assert_eq!(xs[old2new[0]], 0.0);
    }

    #[test]
    fn identity_order_keeps_geometry() {
        let mut n = two_quads();
        let before = n.fetch_f64_vec("coordsets/coords/values/x").unwrap();
        let old2new = reorder(&mut n, "mesh", &[0, 1]).unwrap();
        assert_eq!(old2new, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            n.fetch_f64_vec("coordsets/coords/values/x").unwrap(),
            before
        );
    }
}
