use mesh_loom::algs::point_merge::PointMerge;
use mesh_loom::tree::Node;
use proptest::prelude::*;

fn coordset_2d(xs: Vec<f64>, ys: Vec<f64>) -> Node {
    let mut n = Node::new();
    n.fetch_mut("type").set("explicit");
    n.fetch_mut("values/x").set(xs);
    n.fetch_mut("values/y").set(ys);
    n
}

fn unit_square(x0: f64) -> Node {
    coordset_2d(
        vec![x0, x0 + 1.0, x0 + 1.0, x0],
        vec![0.0, 0.0, 1.0, 1.0],
    )
}

#[test]
fn two_squares_share_an_edge() {
    let a = unit_square(0.0);
    let b = unit_square(1.0);
    let mut pm = PointMerge::new();
    let out = pm.execute(&[&a, &b], 1e-3).unwrap();

    assert_eq!(pm.num_points(), 6);
    assert_eq!(
        out.fetch_f64_vec("coordsets/coords/values/x").unwrap().len(),
        6
    );

    // Exactly the two seam points carry contributions from both domains.
    let shared: Vec<_> = pm.records().filter(|r| r.orig_ids.len() == 2).collect();
    assert_eq!(shared.len(), 2);
    for rec in shared {
        assert_eq!(rec.orig_domains, vec![0, 1]);
    }
}

#[test]
fn merge_is_idempotent() {
    let a = unit_square(0.0);
    let b = unit_square(1.0);
    let mut pm = PointMerge::new();
    let first = pm.execute(&[&a, &b], 1e-3).unwrap();
    let npoints = pm.num_points();

    let merged_coords = first.fetch_existing("coordsets/coords").unwrap();
    let mut again = PointMerge::new();
    again.execute(&[merged_coords], 1e-3).unwrap();
    assert_eq!(again.num_points(), npoints);
}

#[test]
fn merged_coordinates_stay_within_quantization() {
    let xs = vec![0.12345, 1.5, -2.25, 0.12349];
    let ys = vec![7.0, -0.001, 3.75, 7.00002];
    let cs = coordset_2d(xs.clone(), ys.clone());
    let mut pm = PointMerge::new();
    let out = pm.execute(&[&cs], 1e-4).unwrap();

    let ox = out.fetch_f64_vec("coordsets/coords/values/x").unwrap();
    let oy = out.fetch_f64_vec("coordsets/coords/values/y").unwrap();
    let bound = 1.0 / pm.scale();
    for i in 0..xs.len() {
        let q = pm.merged_id(0, i).unwrap();
        assert!((xs[i] - ox[q]).abs() <= bound);
        assert!((ys[i] - oy[q]).abs() <= bound);
    }
}

#[test]
fn every_input_point_lands_in_exactly_one_record() {
    let a = unit_square(0.0);
    let b = unit_square(1.0);
    let mut pm = PointMerge::new();
    pm.execute(&[&a, &b], 1e-3).unwrap();

    let mut seen = std::collections::BTreeSet::new();
    for rec in pm.records() {
        for (&d, &i) in rec.orig_domains.iter().zip(rec.orig_ids.iter()) {
            assert!(seen.insert((d, i)), "({d},{i}) appears in two records");
        }
    }
    assert_eq!(seen.len(), 8);
}

proptest! {
    /// Re-merging a merge's output never changes the point count.
    #[test]
    fn idempotence_under_random_clouds(
        pts in proptest::collection::vec((-100.0f64..100.0, -100.0f64..100.0), 1..60)
    ) {
        let (xs, ys): (Vec<f64>, Vec<f64>) = pts.into_iter().unzip();
        let cs = coordset_2d(xs, ys);
        let mut pm = PointMerge::new();
        let first = pm.execute(&[&cs], 1e-3).unwrap();
        let n = pm.num_points();

        let mut again = PointMerge::new();
        again
            .execute(&[first.fetch_existing("coordsets/coords").unwrap()], 1e-3)
            .unwrap();
        prop_assert_eq!(again.num_points(), n);
    }
}
