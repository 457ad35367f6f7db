// tests/joins.rs
use anyhow::Result;
use ironmerge::testing::*;
use ironmerge::*;

fn users(p: &Pipeline, shards: usize) -> Dataset<Record> {
    from_vec(
        p,
        records(&[(1, "ann"), (2, "bob"), (3, "cy"), (1, "ann2")]),
        Some(shards),
    )
}

fn orders(p: &Pipeline, shards: usize) -> Dataset<Record> {
    from_vec(
        p,
        records(&[(1, "book"), (3, "lamp"), (4, "pen"), (3, "mug")]),
        Some(shards),
    )
}

#[test]
fn inner_join_across_uneven_shards_seq_par() -> Result<()> {
    let p = Pipeline::default();
    let joined = users(&p, 3).join(&orders(&p, 2));
    let expected = vec![
        Joined::matched(1, "ann", "book"),
        Joined::matched(1, "ann2", "book"),
        Joined::matched(3, "cy", "lamp"),
        Joined::matched(3, "cy", "mug"),
    ];
    assert_collections_unordered_equal(&joined.collect_seq()?, &expected);
    assert_collections_unordered_equal(&joined.collect_par(None)?, &expected);
    assert_eq!(joined.shard_count(), 3);
    Ok(())
}

#[test]
fn outer_variants() -> Result<()> {
    let p = Pipeline::default();
    let (u, o) = (users(&p, 2), orders(&p, 4));
    let matched = vec![
        Joined::matched(1, "ann", "book"),
        Joined::matched(1, "ann2", "book"),
        Joined::matched(3, "cy", "lamp"),
        Joined::matched(3, "cy", "mug"),
    ];

    let mut left = matched.clone();
    left.push(Joined::left_only(2, "bob"));
    assert_collections_unordered_equal(&u.join_left(&o).collect_par(None)?, &left);

    let mut right = matched.clone();
    right.push(Joined::right_only(4, "pen"));
    assert_collections_unordered_equal(&u.join_right(&o).collect_seq()?, &right);

    let mut full = matched.clone();
    full.push(Joined::left_only(2, "bob"));
    full.push(Joined::right_only(4, "pen"));
    assert_collections_unordered_equal(&u.join_full(&o).collect_par(Some(1))?, &full);

    assert_collections_unordered_equal(&u.join_inner(&o).collect_seq()?, &matched);
    Ok(())
}

#[test]
fn every_shard_comes_out_sorted() -> Result<()> {
    let p = Pipeline::default();
    let left = from_vec(&p, (0..300i64).rev().map(|i| Record::new(i % 37, i)).collect(), Some(5));
    let right = from_vec(&p, (0..100i64).map(|i| Record::new(i % 41, i)).collect(), Some(3));
    for shard in left.join_full(&right).collect_shards(ExecMode::Parallel { capacity: Some(4) })? {
        assert_keys_ascending(&shard, &Comparator::Int64, |row| &row.key);
    }
    Ok(())
}

#[test]
fn single_shard_inputs_keep_arrival_order() -> Result<()> {
    let p = Pipeline::default();
    let left = from_vec(&p, records(&[(2, "b1"), (1, "a"), (2, "b2")]), Some(1));
    let right = from_vec(&p, records(&[(2, "x"), (2, "y")]), Some(1));
    let out = collect_both_modes(&left.join(&right))?;
    assert_collections_equal(
        &out,
        &[
            Joined::matched(2, "b1", "x"),
            Joined::matched(2, "b1", "y"),
            Joined::matched(2, "b2", "x"),
            Joined::matched(2, "b2", "y"),
        ],
    );
    Ok(())
}

#[test]
fn joining_a_dataset_with_itself_runs_the_self_join() -> Result<()> {
    let p = TestPipeline::new();
    let data = from_vec(&p, records(&[(1, "a"), (1, "b"), (2, "c")]), Some(1));
    let out = collect_both_modes(&data.join(&data.clone()))?;
    assert_collections_equal(
        &out,
        &[
            Joined::matched(1, "a", "a"),
            Joined::matched(1, "a", "b"),
            Joined::matched(1, "b", "a"),
            Joined::matched(1, "b", "b"),
            Joined::matched(2, "c", "c"),
        ],
    );
    assert!(p.stage_names().contains(&"SelfJoin".to_string()));
    assert!(!p.stage_names().contains(&"JoinHashedSorted".to_string()));
    Ok(())
}

#[test]
fn equal_but_distinct_datasets_use_the_merge_join() -> Result<()> {
    let p = TestPipeline::new();
    let a = from_vec(&p, records(&[(1, "a")]), Some(1));
    let b = from_vec(&p, records(&[(1, "a")]), Some(1));
    assert_collections_equal(&a.join(&b).collect_seq()?, &[Joined::matched(1, "a", "a")]);
    assert!(p.stage_names().contains(&"JoinHashedSorted".to_string()));
    Ok(())
}

#[test]
fn self_join_engine_on_sorted_shards() -> Result<()> {
    let p = Pipeline::default();
    let data = from_shards(
        &p,
        vec![records(&[(1, "a"), (1, "b")]), records(&[(2, "c")])],
    )?;
    let shards = data.self_join(None).collect_shards(ExecMode::Sequential)?;
    assert_eq!(
        shards,
        vec![
            vec![
                Paired::new(1, "a", "a"),
                Paired::new(1, "a", "b"),
                Paired::new(1, "b", "a"),
                Paired::new(1, "b", "b"),
            ],
            vec![Paired::new(2, "c", "c")],
        ]
    );
    Ok(())
}

#[test]
fn self_join_skips_null_values() -> Result<()> {
    let p = Pipeline::default();
    let data = from_shards(
        &p,
        vec![vec![Record::new("k", Value::Null), Record::new("k", 7)]],
    )?;
    let out = collect_both_modes(&data.self_join(None))?;
    assert_collections_equal(&out, &[Paired::new("k", 7, 7)]);
    Ok(())
}

#[test]
fn explicit_comparator_sorts_and_merges() -> Result<()> {
    let p = Pipeline::default();
    let left = from_vec(&p, records(&[(true, "t"), (false, "f")]), Some(2));
    let right = from_vec(&p, records(&[(true, "T")]), Some(2));
    let options = JoinOptions::left().with_comparator(Comparator::custom(natural_order));
    let out = left.join_with(&right, options).collect_par(None)?;
    assert_collections_unordered_equal(
        &out,
        &[Joined::matched(true, "t", "T"), Joined::left_only(false, "f")],
    );
    Ok(())
}

#[test]
fn unsupported_key_type_surfaces_through_orchestration() {
    let p = Pipeline::default();
    let left = from_vec(&p, vec![Record::new(vec![1u8], 1)], Some(2));
    let right = from_vec(&p, vec![Record::new(vec![1u8], 2)], Some(2));
    let err = left.join(&right).collect_par(None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<JoinError>(),
        Some(&JoinError::UnsupportedKeyType { type_name: "bytes" })
    );
}

#[test]
fn large_join_with_tiny_queues() -> Result<()> {
    let p = Pipeline::default();
    let left = from_vec(&p, (0..1000i64).map(|i| Record::new(i % 100, i)).collect(), Some(7));
    let right = from_vec(&p, (0..200i64).map(|i| Record::new(i % 50, i)).collect(), Some(3));

    let inner = left.join(&right).collect_par(Some(1))?;
    assert_eq!(inner.len(), 50 * 10 * 4);
    assert!(inner.iter().all(|j| j.left.is_some() && j.right.is_some()));

    let full = left.join_full(&right).collect_par(Some(1))?;
    assert_eq!(full.len(), 50 * 10 * 4 + 50 * 10);
    assert_eq!(full.iter().filter(|j| j.right.is_none()).count(), 500);

    assert_eq!(left.join_full(&right).collect_seq()?.len(), full.len());
    Ok(())
}

#[test]
fn downstream_map_and_filter() -> Result<()> {
    let p = Pipeline::default();
    let matched_keys = users(&p, 2)
        .join_full(&orders(&p, 2))
        .filter(|j: &Joined| j.left.is_some() && j.right.is_some())
        .map(|j: &Joined| j.key.clone());
    let mut keys = matched_keys.collect_seq()?;
    keys.sort_by(natural_order);
    keys.dedup();
    assert_eq!(keys, vec![Value::Int64(1), Value::Int64(3)]);
    Ok(())
}

#[test]
fn multi_shard_sources_join_identically_on_every_run() -> Result<()> {
    let p = Pipeline::default();
    let left = from_vec(&p, (0..400i64).map(|i| Record::new(i % 4, i)).collect(), Some(8));
    let right = from_vec(&p, records(&[(0, "r")]), Some(1));
    let joined = left.join(&right);

    // key 0 values come out in source order: upstream shard first, then position
    let expected: Vec<Joined> = (0..400i64)
        .filter(|i| i % 4 == 0)
        .map(|i| Joined::matched(0, i, "r"))
        .collect();
    assert_collections_equal(&collect_both_modes(&joined)?, &expected);
    for _ in 0..10 {
        assert_collections_equal(&joined.collect_par(Some(1))?, &expected);
    }
    Ok(())
}

#[test]
fn self_join_of_multi_shard_source_is_deterministic() -> Result<()> {
    let p = Pipeline::default();
    let data = from_vec(&p, (0..60i64).map(|i| Record::new(i % 3, i)).collect(), Some(6));
    let first = collect_both_modes(&data.join(&data))?;
    assert_eq!(first.len(), 3 * 20 * 20);
    for _ in 0..5 {
        assert_collections_equal(&data.join(&data).collect_par(Some(2))?, &first);
    }
    Ok(())
}
