use mesh_loom::mesh_error::MeshLoomError;
use mesh_loom::partition::Partitioner;
use mesh_loom::tiling::tiled;
use mesh_loom::tree::Node;

/// One tiled domain spanning `[x0, x0+20] x [0, 20]`.
fn tiled_domain(x0: f64) -> Node {
    let mut options = Node::new();
    options.fetch_mut("reorder").set(0i64);
    options
        .fetch_mut("extents")
        .set(vec![x0, x0 + 20.0, 0.0, 20.0, 0.0, 0.0]);
    let mut domain = Node::new();
    tiled(1, 1, 0, &mut domain, &options).unwrap();
    domain.fetch_mut("state/cycle").set(100i64);
    domain.fetch_mut("state/domain_id").set(0i64);
    domain
}

/// A root holding two side-by-side domains.
fn two_domain_input() -> Node {
    let mut input = Node::new();
    input.set_child("domain0", tiled_domain(0.0));
    input.set_child("domain1", tiled_domain(20.0));
    input
}

#[test]
fn default_target_keeps_one_domain_per_input() {
    let input = two_domain_input();
    let mut output = Node::new();
    let mut p = Partitioner::new();
    p.execute(&input, &Node::new(), &mut output).unwrap();

    assert_eq!(p.target(), 2);
    assert_eq!(output.num_children(), 2);
    let d0 = output.fetch_existing("domain_000000").unwrap();
    let d1 = output.fetch_existing("domain_000001").unwrap();
    assert_eq!(d0.fetch_i64("state/domain_id").unwrap(), 0);
    assert_eq!(d1.fetch_i64("state/domain_id").unwrap(), 1);
    // The wrapped views carried the cycle along.
    assert_eq!(d0.fetch_i64("state/cycle").unwrap(), 100);
    assert_eq!(
        d0.fetch_i64_vec("topologies/mesh/elements/sizes").unwrap().len(),
        24
    );
}

#[test]
fn splitting_reaches_the_requested_target() {
    let mut input = Node::new();
    {
        let mut options = Node::new();
        options.fetch_mut("reorder").set(0i64);
        tiled(2, 2, 0, &mut input, &options).unwrap();
    }
    let mut options = Node::new();
    options.fetch_mut("target").set(2i64);
    let mut output = Node::new();
    Partitioner::new()
        .execute(&input, &options, &mut output)
        .unwrap();

    // One 96-element domain split into two 48-element halves.
    assert_eq!(output.num_children(), 2);
    for name in ["domain_000000", "domain_000001"] {
        let d = output.fetch_existing(name).unwrap();
        assert_eq!(
            d.fetch_i64_vec("topologies/mesh/elements/sizes").unwrap().len(),
            48
        );
    }
}

#[test]
fn combining_two_domains_merges_their_seam() {
    let input = two_domain_input();
    let mut options = Node::new();
    options.fetch_mut("target").set(1i64);
    let mut output = Node::new();
    Partitioner::new()
        .execute(&input, &options, &mut output)
        .unwrap();

    // Single output domain, delivered at the root.
    assert_eq!(output.fetch_i64("state/domain_id").unwrap(), 0);
    assert_eq!(
        output
            .fetch_i64_vec("topologies/mesh/elements/sizes")
            .unwrap()
            .len(),
        48
    );
    // 33 + 33 points with the 5 seam points fused.
    let xs = output.fetch_f64_vec("coordsets/coords/values/x").unwrap();
    assert_eq!(xs.len(), 61);
    // Connectivity was remapped onto the merged ids.
    let conn = output
        .fetch_i64_vec("topologies/mesh/elements/connectivity")
        .unwrap();
    assert!(conn.iter().all(|&p| (p as usize) < xs.len()));
    // The combined boundary field survived the concatenation.
    assert_eq!(
        output
            .fetch_i64_vec("fields/boundary_type/values")
            .unwrap()
            .len(),
        32
    );
}

#[test]
fn pinned_domains_pass_through_unchanged() {
    let input = two_domain_input();
    let mut options = Node::new();
    options.fetch_mut("target").set(2i64);
    options.fetch_mut("destination_ranks").set(vec![0i64, 0]);
    options.fetch_mut("destination_domains").set(vec![5i64, 9]);
    let mut output = Node::new();
    Partitioner::new()
        .execute(&input, &options, &mut output)
        .unwrap();

    assert_eq!(output.num_children(), 2);
    assert!(output.has_path("domain_000005"));
    assert!(output.has_path("domain_000009"));
    assert_eq!(
        output
            .fetch_i64("domain_000005/state/domain_id")
            .unwrap(),
        5
    );
}

#[test]
fn mixed_pinning_is_rejected() {
    let input = two_domain_input();
    let mut options = Node::new();
    options.fetch_mut("destination_ranks").set(vec![0i64, -1]);
    options.fetch_mut("destination_domains").set(vec![3i64, -1]);
    let mut output = Node::new();
    assert_eq!(
        Partitioner::new()
            .execute(&input, &options, &mut output)
            .unwrap_err(),
        MeshLoomError::MixedDestinationSpecification
    );
}

#[test]
fn half_specified_pin_is_rejected() {
    let input = two_domain_input();
    let mut options = Node::new();
    options.fetch_mut("destination_ranks").set(vec![0i64, 0]);
    let mut output = Node::new();
    assert!(matches!(
        Partitioner::new().execute(&input, &options, &mut output),
        Err(MeshLoomError::OptionsTypeMismatch { .. })
    ));
}

#[test]
fn split_chunks_cover_the_input_elements() {
    let mut input = Node::new();
    {
        let mut options = Node::new();
        options.fetch_mut("reorder").set(0i64);
        tiled(2, 1, 0, &mut input, &options).unwrap();
    }
    let mut options = Node::new();
    options.fetch_mut("target").set(3i64);
    let mut output = Node::new();
    Partitioner::new()
        .execute(&input, &options, &mut output)
        .unwrap();

    assert_eq!(output.num_children(), 3);
    let total: usize = (0..3)
        .map(|d| {
            output
                .fetch_i64_vec(&format!("domain_{d:06}/topologies/mesh/elements/sizes"))
                .unwrap()
                .len()
        })
        .sum();
    assert_eq!(total, 48);
}
