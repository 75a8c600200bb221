
#[cfg(test)]
mod zset_test {
    use crate::config::Config;
    use crate::dict::lib::{DictResizeFlag, DictType};
    use crate::skiplist::{LexRangeSpec, RangeSpec};
    use crate::value::{self, Value};
    use crate::zset::error::ZSetError;
    use crate::zset::zset::{AddFlags, AddOutcome, ZSet};

    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use proptest::prelude::*;

    fn v(s: &str) -> Value {
        Value::from(s)
    }

    fn members(zs: &ZSet) -> Vec<(String, f64)> {
        zs.iter().map(|(m, s)| (m.to_string(), s)).collect()
    }

    fn five() -> ZSet {
        let mut zs = ZSet::new();
        for (i, m) in ["one", "two", "three", "four", "five"].into_iter().enumerate() {
            zs.add(v(m), (i + 1) as f64).unwrap();
        }
        zs
    }

    #[test]
    fn equal_scores_break_ties_by_member() -> Result<(), ZSetError> {
        print!("[TEST] Members with equal scores are ordered by member: ");
        let mut zs = ZSet::new();
        zs.add(v("a"), 1.0)?;
        zs.add(v("c"), 2.0)?;
        zs.add(v("b"), 2.0)?;
        assert_eq!(
            members(&zs),
            vec![("a".to_string(), 1.0), ("b".to_string(), 2.0), ("c".to_string(), 2.0)]
        );
        assert_eq!(zs.rank(&v("c"), false)?, Some(3));
        assert_eq!(zs.skiplist().get_rank(2.0, &v("c")), 3);
        assert_eq!(zs.rank(&v("c"), true)?, Some(1));
        assert_eq!(zs.rank(&v("zz"), false)?, None);
        println!("PASS");
        Ok(())
    }

    #[test]
    fn update_replaces_the_node() -> Result<(), ZSetError> {
        print!("[TEST] Re-adding a member moves it instead of duplicating it: ");
        let mut zs = ZSet::new();
        assert_eq!(zs.add(v("x"), 5.0)?, AddOutcome::Added);
        assert_eq!(zs.add(v("x"), 9.0)?, AddOutcome::ScoreUpdated);
        assert_eq!(zs.add(v("x"), 9.0)?, AddOutcome::Unchanged);
        assert_eq!(zs.len(), 1);
        assert_eq!(zs.dict().dict_size(), 1);
        assert_eq!(zs.score(&v("x")), Some(9.0));
        assert_eq!(zs.count(&RangeSpec::closed(5.0, 5.0)), 0);
        assert_eq!(zs.count(&RangeSpec::closed(9.0, 9.0)), 1);
        assert_eq!(members(&zs), vec![("x".to_string(), 9.0)]);
        zs.check_consistency()?;
        println!("PASS");
        Ok(())
    }

    #[test]
    fn integer_and_string_members_are_one() -> Result<(), ZSetError> {
        let mut zs = ZSet::new();
        assert_eq!(zs.add(Value::Int(7), 1.0)?, AddOutcome::Added);
        assert_eq!(zs.add(v("7"), 2.0)?, AddOutcome::ScoreUpdated);
        assert_eq!(zs.len(), 1);
        assert_eq!(zs.score(&Value::Int(7)), Some(2.0));
        zs.check_consistency()?;
        Ok(())
    }

    #[test]
    fn nan_scores_are_rejected() {
        let mut zs = ZSet::new();
        assert_eq!(zs.add(v("a"), f64::NAN), Err(ZSetError::ScoreIsNaN));
        assert!(zs.is_empty());
        zs.add(v("a"), f64::INFINITY).unwrap();
        assert_eq!(zs.incr_by(v("a"), f64::NEG_INFINITY), Err(ZSetError::ScoreIsNaN));
        assert_eq!(zs.score(&v("a")), Some(f64::INFINITY));
    }

    #[test]
    fn add_flags() -> Result<(), ZSetError> {
        print!("[TEST] NX, XX, GT, LT and INCR: ");
        let mut zs = ZSet::new();
        let nx = AddFlags { nx: true, ..Default::default() };
        let xx = AddFlags { xx: true, ..Default::default() };
        let gt = AddFlags { gt: true, ..Default::default() };
        let lt = AddFlags { lt: true, ..Default::default() };

        assert_eq!(zs.add_with(v("a"), 1.0, xx)?, (AddOutcome::Skipped, None));
        assert!(zs.is_empty());
        assert_eq!(zs.add_with(v("a"), 1.0, nx)?, (AddOutcome::Added, Some(1.0)));
        assert_eq!(zs.add_with(v("a"), 2.0, nx)?, (AddOutcome::Skipped, Some(1.0)));
        assert_eq!(zs.add_with(v("a"), 3.0, xx)?, (AddOutcome::ScoreUpdated, Some(3.0)));
        assert_eq!(zs.add_with(v("a"), 2.0, gt)?, (AddOutcome::Skipped, Some(3.0)));
        assert_eq!(zs.add_with(v("a"), 4.0, gt)?, (AddOutcome::ScoreUpdated, Some(4.0)));
        assert_eq!(zs.add_with(v("a"), 5.0, lt)?, (AddOutcome::Skipped, Some(4.0)));
        assert_eq!(zs.add_with(v("a"), 0.5, lt)?, (AddOutcome::ScoreUpdated, Some(0.5)));
        // GT alone still adds new members
        assert_eq!(zs.add_with(v("b"), 1.0, gt)?, (AddOutcome::Added, Some(1.0)));

        assert_eq!(zs.incr_by(v("a"), 2.0)?, 2.5);
        assert_eq!(zs.incr_by(v("c"), -1.0)?, -1.0);
        assert_eq!(zs.rank(&v("c"), false)?, Some(1));

        let bad = AddFlags { nx: true, xx: true, ..Default::default() };
        assert!(matches!(zs.add_with(v("a"), 1.0, bad), Err(ZSetError::InvalidFlags(_))));
        let bad = AddFlags { gt: true, lt: true, ..Default::default() };
        assert!(matches!(zs.add_with(v("a"), 1.0, bad), Err(ZSetError::InvalidFlags(_))));
        zs.check_consistency()?;
        println!("PASS");
        Ok(())
    }

    #[test]
    fn remove_members() -> Result<(), ZSetError> {
        let mut zs = five();
        assert_eq!(zs.remove(&v("three"))?, Some(3.0));
        assert_eq!(zs.remove(&v("three"))?, None);
        assert_eq!(zs.len(), 4);
        assert!(!zs.contains(&v("three")));
        assert_eq!(zs.rank(&v("four"), false)?, Some(3));
        zs.check_consistency()?;
        Ok(())
    }

    #[test]
    fn ranges_by_rank() {
        let zs = five();
        let names = |r: Vec<(Value, f64)>| r.into_iter().map(|(m, _)| m.to_string()).collect::<Vec<_>>();
        assert_eq!(names(zs.range_by_rank(2, 3, false)), vec!["two", "three"]);
        assert_eq!(names(zs.range_by_rank(1, 2, true)), vec!["five", "four"]);
        assert_eq!(names(zs.range_by_rank(4, 100, false)), vec!["four", "five"]);
        assert_eq!(names(zs.range_by_rank(0, 1, false)), vec!["one"]);
        assert!(zs.range_by_rank(4, 3, false).is_empty());
        assert!(zs.range_by_rank(6, 9, false).is_empty());
        assert_eq!(zs.range_by_rank(1, 5, true).len(), 5);
    }

    #[test]
    fn ranges_by_score() -> Result<(), ZSetError> {
        let zs = five();
        let scores = |r: Vec<(Value, f64)>| r.into_iter().map(|(_, s)| s).collect::<Vec<_>>();

        let range = RangeSpec::parse("(1", "4")?;
        assert_eq!(scores(zs.range_by_score(&range, false, 0, None)), vec![2.0, 3.0, 4.0]);
        assert_eq!(scores(zs.range_by_score(&range, true, 0, None)), vec![4.0, 3.0, 2.0]);
        assert_eq!(scores(zs.range_by_score(&range, false, 1, Some(1))), vec![3.0]);
        assert_eq!(scores(zs.range_by_score(&range, true, 2, Some(5))), vec![2.0]);
        assert!(zs.range_by_score(&range, false, 5, None).is_empty());
        assert!(zs.range_by_score(&range, false, 0, Some(0)).is_empty());
        assert_eq!(zs.count(&range), 3);
        assert_eq!(zs.count(&RangeSpec::parse("-inf", "+inf")?), 5);
        assert_eq!(zs.count(&RangeSpec::parse("(5", "+inf")?), 0);
        Ok(())
    }

    #[test]
    fn ranges_by_lex() -> Result<(), ZSetError> {
        let mut zs = ZSet::new();
        for m in ["a", "b", "c", "d", "e", "f", "g"] {
            zs.add(v(m), 0.0)?;
        }
        let names = |r: Vec<(Value, f64)>| r.into_iter().map(|(m, _)| m.to_string()).collect::<Vec<_>>();

        let range = LexRangeSpec::parse("[c", "(f")?;
        assert_eq!(names(zs.range_by_lex(&range, false, 0, None)), vec!["c", "d", "e"]);
        assert_eq!(names(zs.range_by_lex(&range, true, 0, Some(2))), vec!["e", "d"]);
        assert_eq!(zs.lex_count(&range), 3);
        assert_eq!(zs.lex_count(&LexRangeSpec::parse("-", "+")?), 7);
        assert_eq!(zs.lex_count(&LexRangeSpec::parse("(g", "+")?), 0);

        assert_eq!(zs.delete_range_by_lex(&LexRangeSpec::parse("-", "[b")?)?, 2);
        assert_eq!(zs.len(), 5);
        assert!(!zs.contains(&v("a")));
        zs.check_consistency()?;
        Ok(())
    }

    #[test]
    fn delete_middle_ranks() -> Result<(), ZSetError> {
        print!("[TEST] Delete ranks 2..=4 of five members: ");
        let mut zs = ZSet::new();
        for i in 1..=5 {
            zs.add(Value::Int(i), i as f64)?;
        }
        assert_eq!(zs.delete_range_by_rank(2, 4)?, 3);
        assert_eq!(zs.len(), 2);
        assert_eq!(zs.dict().dict_size(), 2);
        assert_eq!(members(&zs), vec![("1".to_string(), 1.0), ("5".to_string(), 5.0)]);
        assert_eq!(zs.rank(&Value::Int(5), false)?, Some(2));
        zs.check_consistency()?;
        println!("PASS");

        assert_eq!(zs.delete_range_by_rank(3, 10)?, 0);
        assert_eq!(zs.delete_range_by_rank(0, 10)?, 2);
        assert!(zs.is_empty());
        Ok(())
    }

    #[test]
    fn delete_by_score() -> Result<(), ZSetError> {
        let mut zs = five();
        assert_eq!(zs.delete_range_by_score(&RangeSpec::parse("2", "(4")?)?, 2);
        assert_eq!(
            members(&zs),
            vec![("one".to_string(), 1.0), ("four".to_string(), 4.0), ("five".to_string(), 5.0)]
        );
        assert_eq!(zs.delete_range_by_score(&RangeSpec::closed(10.0, 1.0))?, 0);
        zs.check_consistency()?;
        Ok(())
    }

    #[test]
    fn pop_both_ends() -> Result<(), ZSetError> {
        let mut zs = five();
        assert_eq!(zs.pop_min(2)?, vec![(v("one"), 1.0), (v("two"), 2.0)]);
        assert_eq!(zs.pop_max(1)?, vec![(v("five"), 5.0)]);
        assert_eq!(zs.len(), 2);
        assert_eq!(zs.pop_max(10)?.len(), 2);
        assert!(zs.pop_min(1)?.is_empty());
        zs.check_consistency()?;
        Ok(())
    }

    #[test]
    fn delete_everything_by_ascending_rank() -> Result<(), ZSetError> {
        print!("[TEST] Removing rank 1 until empty drains both structures: ");
        let mut zs = ZSet::new();
        for i in 0..500 {
            zs.add(Value::Int(i), ((i * 7919) % 101) as f64)?;
        }
        while !zs.is_empty() {
            assert_eq!(zs.delete_range_by_rank(1, 1)?, 1);
        }
        assert_eq!(zs.len(), 0);
        assert_eq!(zs.dict().dict_size(), 0);
        zs.check_consistency()?;
        println!("PASS");
        Ok(())
    }

    #[test]
    fn rebuild_from_pairs() -> Result<(), ZSetError> {
        let zs = five();
        let copy: ZSet = zs.iter().map(|(m, s)| (m.clone(), s)).collect();
        assert_eq!(members(&copy), members(&zs));
        copy.check_consistency()?;

        let with_nan: ZSet = vec![(v("a"), 1.0), (v("b"), f64::NAN), (v("a"), 3.0)]
            .into_iter()
            .collect();
        assert_eq!(members(&with_nan), vec![("a".to_string(), 3.0)]);
        Ok(())
    }

    #[test]
    fn desync_is_reported() {
        let mut zs = five();
        assert!(zs.zsl.delete(2.0, &v("two")));
        assert!(matches!(zs.check_consistency(), Err(ZSetError::Desync(_))));
        assert!(matches!(zs.rank(&v("two"), false), Err(ZSetError::Desync(_))));
        assert!(matches!(zs.add(v("two"), 7.0), Err(ZSetError::Desync(_))));
        assert!(matches!(zs.remove(&v("three")), Ok(Some(_))));
    }

    #[test]
    fn configured_zset() -> Result<(), ZSetError> {
        let config = Config::from_toml_str(
            r#"
            [dict]
            resize_policy = "forbid"
            [skiplist]
            max_level = 4
            "#,
        )
        .unwrap();
        let mut zs = ZSet::with_config(&config);
        for i in 0..300 {
            zs.add(Value::Int(i), i as f64)?;
        }
        assert_eq!(zs.dict().dict_buckets(), 4);
        assert_eq!(zs.dict().resize_policy(), DictResizeFlag::DictResizeForbid);
        assert!(zs.skiplist().level() <= 4);
        assert_eq!(zs.rank(&Value::Int(299), false)?, Some(300));
        zs.check_consistency()?;
        Ok(())
    }

    #[test]
    fn configured_probability_out_of_range() -> Result<(), ZSetError> {
        let config = Config::from_toml_str("[skiplist]\np = 1.5").unwrap();
        let mut zs: ZSet = ZSet::with_config(&config);
        for i in 0..50 {
            zs.add(Value::Int(i), i as f64)?;
        }
        assert_eq!(zs.skiplist().probability(), 0.25);
        assert_eq!(zs.len(), 50);
        zs.check_consistency()?;
        Ok(())
    }

    #[test]
    fn custom_types() -> Result<(), ZSetError> {
        static DROPPED: AtomicUsize = AtomicUsize::new(0);
        let dict_type = DictType {
            key_destructor: Some(Box::new(|_: Value| {
                DROPPED.fetch_add(1, AtomicOrdering::Relaxed);
            })),
            ..Default::default()
        };
        // ties on score sort members from high to low
        let mut zs = ZSet::with_types(Arc::new(dict_type), |a: &Value, b: &Value| {
            value::compare(b, a)
        });
        for m in ["a", "b", "c", "d"] {
            zs.add(v(m), 1.0)?;
        }
        zs.add(v("z"), 0.0)?;
        assert_eq!(
            members(&zs),
            vec![
                ("z".to_string(), 0.0),
                ("d".to_string(), 1.0),
                ("c".to_string(), 1.0),
                ("b".to_string(), 1.0),
                ("a".to_string(), 1.0),
            ]
        );
        assert_eq!(zs.rank(&v("a"), false)?, Some(5));

        assert_eq!(zs.delete_range_by_score(&RangeSpec::closed(1.0, 1.0))?, 4);
        assert_eq!(DROPPED.load(AtomicOrdering::Relaxed), 4);
        assert_eq!(zs.remove(&v("z"))?, Some(0.0));
        assert!(zs.is_empty());
        zs.check_consistency()?;
        Ok(())
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, i8),
        Remove(u8),
        Incr(u8, i8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..24u8, -8..8i8).prop_map(|(m, s)| Op::Add(m, s)),
            (0..24u8).prop_map(Op::Remove),
            (0..24u8, -3..3i8).prop_map(|(m, d)| Op::Incr(m, d)),
        ]
    }

    proptest! {
        #[test]
        fn prop_dict_and_skiplist_agree(ops in prop::collection::vec(op(), 1..200)) {
            let mut zs = ZSet::new();
            let mut model: BTreeMap<Value, f64> = BTreeMap::new();
            for op in ops {
                match op {
                    Op::Add(m, s) => {
                        let m = Value::Int(m as i64);
                        zs.add(m.clone(), s as f64).unwrap();
                        model.insert(m, s as f64);
                    }
                    Op::Remove(m) => {
                        let m = Value::Int(m as i64);
                        prop_assert_eq!(zs.remove(&m).unwrap(), model.remove(&m));
                    }
                    Op::Incr(m, d) => {
                        let m = Value::Int(m as i64);
                        let score = zs.incr_by(m.clone(), d as f64).unwrap();
                        let entry = model.entry(m).or_insert(0.0);
                        *entry += d as f64;
                        prop_assert_eq!(score, *entry);
                    }
                }
                prop_assert_eq!(zs.dict().dict_size(), zs.skiplist().len());
            }
            prop_assert!(zs.check_consistency().is_ok());

            let mut expected: Vec<(Value, f64)> = model.into_iter().collect();
            expected.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            let actual: Vec<(Value, f64)> = zs.iter().map(|(m, s)| (m.clone(), s)).collect();
            prop_assert_eq!(&actual, &expected);
            for (pos, (m, s)) in expected.iter().enumerate() {
                prop_assert_eq!(zs.skiplist().get_rank(*s, m), pos as u64 + 1);
                prop_assert_eq!(zs.rank(m, false).unwrap(), Some(pos as u64 + 1));
            }
        }

        #[test]
        fn prop_rank_deletion_empties(scores in prop::collection::vec(-50..50i32, 0..150)) {
            let mut zs = ZSet::new();
            for (i, s) in scores.iter().enumerate() {
                zs.add(Value::Int(i as i64), *s as f64).unwrap();
            }
            let len = zs.len();
            prop_assert_eq!(zs.delete_range_by_rank(1, len).unwrap(), len);
            prop_assert_eq!(zs.len(), 0);
            prop_assert_eq!(zs.dict().dict_size(), 0);
        }
    }
}
