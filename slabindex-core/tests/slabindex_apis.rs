use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use slabindex::{
    worker_path, ErrorCode, InsertOutcome, Locator, Options, PageCache, PageKey, RemoveOutcome,
    Result, SlabIndex, UpdateOutcome,
};

// Here are the highest level APIs tests.
// Some `mod`s also have their own tests inside.

#[test]
fn test_crud() -> Result<()> {
    test_index("test_crud", 0, |mut index| {
        let pairs = obtain_pairs(500, 0xc0de);

        for (key, locator) in &pairs {
            assert_eq!(index.insert(*key, *locator)?, InsertOutcome::Inserted);
        }
        for (key, locator) in &pairs {
            assert_eq!(index.search(*key)?, Some(*locator));
        }

        // Test `insert` of existing keys.
        for (key, _) in pairs.iter().take(50) {
            assert_eq!(
                index.insert(*key, Locator::new(0, 0))?,
                InsertOutcome::Duplicate
            );
        }

        // Test `update`.
        for (key, locator) in pairs.iter().take(100) {
            let moved = Locator::new(locator.segment_id + 1, locator.slot_index);
            assert_eq!(index.update(*key, moved)?, UpdateOutcome::Updated);
            assert_eq!(index.search(*key)?, Some(moved));
        }

        // Test `remove`.
        let (removed, kept) = pairs.split_at(200);
        for (key, _) in removed {
            assert_eq!(index.remove(*key)?, RemoveOutcome::Removed);
        }
        for (key, _) in removed {
            assert_eq!(index.search(*key)?, None);
            assert_eq!(index.remove(*key)?, RemoveOutcome::NotFound);
        }
        for (key, locator) in kept {
            assert_eq!(index.search(*key)?, Some(*locator));
        }
        index.debugger()?.check()?;

        // Test `remove` of everything left.
        for (key, _) in kept {
            assert_eq!(index.remove(*key)?, RemoveOutcome::Removed);
        }
        let debugger = index.debugger()?;
        debugger.check()?;
        assert_eq!(debugger.stats().height, 1);
        assert_eq!(debugger.stats().leaf_count, 1);
        Ok(())
    })
}

#[test]
fn test_first_leaf_split() -> Result<()> {
    test_index("test_first_leaf_split", 1, |mut index| {
        for key in 1..=20 {
            index.insert(key, Locator::new(0, key))?;
        }
        let stats = index.debugger()?.stats();
        assert_eq!(stats.order, 20);
        assert_eq!((stats.height, stats.leaf_count), (1, 1));

        index.insert(21, Locator::new(0, 21))?;
        let debugger = index.debugger()?;
        let stats = debugger.stats();
        assert_eq!((stats.height, stats.leaf_count), (1, 2));
        debugger.check()?;

        // The separator of the two leaves shows up in the dump.
        let dump = format!("{debugger:?}");
        assert!(dump.contains("┣━ 12"));
        Ok(())
    })
}

#[test]
fn test_remove_half() -> Result<()> {
    test_index("test_remove_half", 2, |mut index| {
        for key in 0..1000 {
            index.insert(key, Locator::new(key % 4, key))?;
        }
        for key in 0..500 {
            assert_eq!(index.remove(key)?, RemoveOutcome::Removed);
        }
        index.debugger()?.check()?;

        let entries = index.search_range(0, 1000)?;
        assert_eq!(entries.len(), 500);
        assert_eq!(entries[0].key, 500);
        assert!(entries.windows(2).all(|w| w[0].key < w[1].key));
        Ok(())
    })
}

#[test]
fn test_search_range() -> Result<()> {
    test_index("test_search_range", 3, |mut index| {
        for key in (0..300).map(|k| k * 2) {
            index.insert(key, Locator::new(1, key))?;
        }

        let keys = |entries: Vec<slabindex::Entry>| {
            entries.into_iter().map(|e| e.key).collect::<Vec<_>>()
        };

        assert_eq!(keys(index.search_range(10, 3)?), [10, 12, 14]);
        // An absent start key begins at the next stored key.
        assert_eq!(keys(index.search_range(11, 3)?), [12, 14, 16]);
        // Crosses every leaf boundary.
        assert_eq!(
            keys(index.search_range(0, 300)?),
            (0..300).map(|k| k * 2).collect::<Vec<_>>()
        );
        // Stops at the end of the data.
        assert_eq!(keys(index.search_range(596, 10)?), [596, 598]);
        assert!(index.search_range(599, 10)?.is_empty());
        assert!(index.search_range(0, 0)?.is_empty());

        let mut visited = 0;
        let mut last = None;
        index.for_each(|key, locator| {
            assert!(last < Some(key));
            assert_eq!(locator, Locator::new(1, key));
            last = Some(key);
            visited += 1;
        })?;
        assert_eq!(visited, 300);
        Ok(())
    })
}

#[test]
fn test_update_absent() -> Result<()> {
    test_index("test_update_absent", 4, |mut index| {
        assert_eq!(index.update(7, Locator::new(0, 0))?, UpdateOutcome::NotFound);

        for key in [10, 20, 30] {
            index.insert(key, Locator::new(0, key))?;
        }
        assert_eq!(index.update(15, Locator::new(0, 0))?, UpdateOutcome::Mismatch);
        assert_eq!(index.update(31, Locator::new(0, 0))?, UpdateOutcome::NotFound);
        assert_eq!(index.search(15)?, None);
        Ok(())
    })
}

#[test]
fn test_reopen() -> Result<()> {
    let dir = tempdir();
    let path = worker_path(dir.path(), 5);
    let pairs = obtain_pairs(800, 0xbeef);

    {
        let mut index = Options::new().order(8).open(&path, 5)?;
        for (key, locator) in &pairs {
            index.insert(*key, *locator)?;
        }
        for (key, _) in pairs.iter().take(300) {
            index.remove(*key)?;
        }
        index.sync()?;
    }

    // The stored order wins over the options of a later open.
    let index = SlabIndex::create(&path, 5)?;
    let debugger = index.debugger()?;
    debugger.check()?;
    assert_eq!(debugger.stats().order, 8);
    drop(debugger);

    for (key, _) in pairs.iter().take(300) {
        assert_eq!(index.search(*key)?, None);
    }
    for (key, locator) in pairs.iter().skip(300) {
        assert_eq!(index.search(*key)?, Some(*locator));
    }
    Ok(())
}

#[test]
fn test_force_sync_and_cache() -> Result<()> {
    let dir = tempdir();
    let path = worker_path(dir.path(), 6);

    let mut index = Options::new()
        .force_sync(true)
        .page_cache_capacity(16)
        .open(&path, 6)?;
    let pairs = obtain_pairs(400, 0xcafe);
    for (key, locator) in &pairs {
        index.insert(*key, *locator)?;
    }
    for (key, locator) in pairs.iter().step_by(3) {
        index.update(*key, Locator::new(locator.segment_id, 0))?;
    }
    for (key, _) in pairs.iter().step_by(5) {
        index.remove(*key)?;
    }
    index.debugger()?.check()?;
    drop(index);

    // Whatever the cache served, the file holds the same data.
    let index = SlabIndex::create(&path, 6)?;
    index.debugger()?.check()?;
    for (i, (key, locator)) in pairs.iter().enumerate() {
        let expected = match (i % 5, i % 3) {
            (0, _) => None,
            (_, 0) => Some(Locator::new(locator.segment_id, 0)),
            _ => Some(*locator),
        };
        assert_eq!(index.search(*key)?, expected);
    }
    Ok(())
}

#[test]
fn test_custom_cache() -> Result<()> {
    #[derive(Default)]
    struct Counting {
        reads: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
    }

    impl PageCache for Counting {
        fn lookup(&mut self, _key: PageKey) -> Option<Vec<u8>> {
            None
        }

        fn on_read(&mut self, key: PageKey, _page: &[u8]) {
            assert_eq!(key.file, 9);
            self.reads.fetch_add(1, Ordering::Relaxed);
        }

        fn on_write(&mut self, _key: PageKey, _page: &[u8]) {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    let dir = tempdir();
    let cache = Counting::default();
    let (reads, writes) = (cache.reads.clone(), cache.writes.clone());

    let path = worker_path(dir.path(), 9);
    let mut index = SlabIndex::create_with_cache(path, 9, Options::new(), Box::new(cache))?;
    assert!(writes.load(Ordering::Relaxed) > 0);

    index.insert(1, Locator::new(1, 1))?;
    assert_eq!(index.search(1)?, Some(Locator::new(1, 1)));
    assert!(reads.load(Ordering::Relaxed) > 0);
    Ok(())
}

#[test]
fn test_noop_mutations() -> Result<()> {
    test_index("test_noop_mutations", 13, |mut index| {
        for key in (0..400).map(|k| k * 3) {
            index.insert(key, Locator::new(2, key))?;
        }
        let snapshot = |index: &SlabIndex| -> Result<_> {
            let stats = index.debugger()?.stats();
            let mut entries = Vec::new();
            index.for_each(|key, locator| entries.push((key, locator)))?;
            Ok((stats, entries))
        };
        let before = snapshot(&index)?;

        for key in [1, 500, 1198, u64::MAX] {
            assert_eq!(index.remove(key)?, RemoveOutcome::NotFound);
        }
        for key in [0, 600, 1197] {
            assert_eq!(
                index.insert(key, Locator::new(0, 0))?,
                InsertOutcome::Duplicate
            );
        }
        assert_eq!(snapshot(&index)?, before);
        index.debugger()?.check()
    })
}

#[test]
fn test_remove_until_free_list_full() -> Result<()> {
    let dir = tempdir();
    let path = worker_path(dir.path(), 14);

    let refused = {
        let mut index = Options::new()
            .order(4)
            .page_size(Some(4096))
            .open(&path, 14)?;
        for key in 0..2000 {
            index.insert(key, Locator::new(0, key))?;
        }

        let mut refused = None;
        for key in 0..2000 {
            match index.remove(key) {
                Ok(outcome) => assert_eq!(outcome, RemoveOutcome::Removed),
                Err(err) => {
                    assert_eq!(err.code(), ErrorCode::DatabaseCorrupted);
                    refused = Some(key);
                    break;
                }
            }
        }
        let refused = refused.expect("ascending removal fills the free list");

        // The refused removal left the tree whole, and the index keeps serving.
        let debugger = index.debugger()?;
        debugger.check()?;
        assert!(debugger.stats().free_pages > 100);
        drop(debugger);
        assert_eq!(index.search(refused)?, Some(Locator::new(0, refused)));
        assert_eq!(
            index.update(refused, Locator::new(2, refused))?,
            UpdateOutcome::Updated
        );

        // Splits take pages back from the free list, so removals can merge again.
        for key in 0..refused {
            index.insert(key, Locator::new(1, key))?;
        }
        assert_eq!(index.remove(refused)?, RemoveOutcome::Removed);
        index.debugger()?.check()?;
        refused
    };

    let index = SlabIndex::create(&path, 14)?;
    index.debugger()?.check()?;
    assert_eq!(index.search(refused)?, None);
    assert_eq!(index.search(0)?, Some(Locator::new(1, 0)));
    assert_eq!(index.search(1999)?, Some(Locator::new(0, 1999)));
    Ok(())
}

#[test]
fn test_refuse_after_failed_write() -> Result<()> {
    // Once armed, serves a broken image for every page read after a write.
    #[derive(Default)]
    struct Failing {
        armed: Arc<AtomicBool>,
        wrote: Arc<AtomicBool>,
    }

    impl PageCache for Failing {
        fn lookup(&mut self, _key: PageKey) -> Option<Vec<u8>> {
            let armed = self.armed.load(Ordering::Relaxed);
            (armed && self.wrote.load(Ordering::Relaxed)).then(|| vec![0xff; 4096])
        }

        fn on_write(&mut self, _key: PageKey, _page: &[u8]) {
            self.wrote.store(true, Ordering::Relaxed);
        }
    }

    let dir = tempdir();
    let cache = Failing::default();
    let (armed, wrote) = (cache.armed.clone(), cache.wrote.clone());

    let mut options = Options::new();
    options.order(4).page_size(Some(4096));
    let path = worker_path(dir.path(), 15);
    let mut index = SlabIndex::create_with_cache(&path, 15, options, Box::new(cache))?;
    for key in 0..500 {
        index.insert(key, Locator::new(0, key))?;
    }

    // Removals that only rewrite their leaf pass, the first merge cascade fails midway.
    armed.store(true, Ordering::Relaxed);
    let mut failed = None;
    for key in 0..500 {
        wrote.store(false, Ordering::Relaxed);
        if let Err(err) = index.remove(key) {
            failed = Some(err);
            break;
        }
    }
    let err = failed.expect("a merge cascade reads pages after writing some");
    assert_eq!(err.code(), ErrorCode::DatabaseCorrupted);
    armed.store(false, Ordering::Relaxed);

    let calls = [
        index.search(499).map(drop),
        index.search_range(0, 10).map(drop),
        index.insert(1000, Locator::new(0, 0)).map(drop),
        index.update(499, Locator::new(0, 0)).map(drop),
        index.remove(499).map(drop),
        index.debugger().map(drop),
    ];
    for call in calls {
        assert_eq!(call.unwrap_err().code(), ErrorCode::DatabaseCorrupted);
    }
    Ok(())
}

#[test]
fn test_random_workload() -> Result<()> {
    test_index("test_random_workload", 10, |mut index| {
        let mut rng = StdRng::seed_from_u64(42);
        let mut model = BTreeMap::new();

        for round in 0..4000 {
            let key = rng.gen_range(0..2000u64);
            let locator = Locator::new(rng.gen_range(0..64), rng.gen_range(0..4096));
            match rng.gen_range(0..4) {
                0 => {
                    let expected = match model.remove(&key) {
                        Some(_) => RemoveOutcome::Removed,
                        None => RemoveOutcome::NotFound,
                    };
                    assert_eq!(index.remove(key)?, expected);
                }
                1 => {
                    if index.update(key, locator)? == UpdateOutcome::Updated {
                        assert!(model.insert(key, locator).is_some());
                    }
                }
                _ => {
                    let outcome = index.insert(key, locator)?;
                    let expected = match model.contains_key(&key) {
                        true => InsertOutcome::Duplicate,
                        false => InsertOutcome::Inserted,
                    };
                    assert_eq!(outcome, expected);
                    model.entry(key).or_insert(locator);
                }
            }
            if round % 500 == 0 {
                index.debugger()?.check()?;
            }
        }
        index.debugger()?.check()?;

        let mut visited = Vec::new();
        index.for_each(|key, locator| visited.push((key, locator)))?;
        assert_eq!(visited, model.into_iter().collect::<Vec<_>>());
        Ok(())
    })
}

#[test]
fn test_corrupted_file() {
    let dir = tempdir();
    let path = worker_path(dir.path(), 11);
    fs::write(&path, vec![0x5a; 16 * 1024]).unwrap();

    let err = SlabIndex::create(&path, 11).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FileUnexpected);
}

#[test]
fn test_invalid_options() {
    let dir = tempdir();
    let err = Options::new()
        .order(2)
        .open(worker_path(dir.path(), 12), 12)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InputInvalid);
}

fn test_index(
    name: &str,
    worker_id: u64,
    test: impl FnOnce(SlabIndex) -> Result<()>,
) -> Result<()> {
    init_tracing();
    let dir = tempdir();
    let path = dir.path().join(name);
    open(&path, worker_id).and_then(test)
}

fn open(path: &Path, worker_id: u64) -> Result<SlabIndex> {
    Options::new().page_size(Some(4096)).open(path, worker_id)
}

fn tempdir() -> tempfile::TempDir {
    init_tracing();
    tempfile::tempdir().unwrap()
}

fn init_tracing() {
    _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Distinct keys spread over the whole key space, in random order.
fn obtain_pairs(count: usize, seed: u64) -> Vec<(u64, Locator)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs = (0..count)
        .map(|_| {
            let key = rng.gen::<u64>();
            (key, Locator::new(rng.gen_range(0..1024), rng.gen_range(0..65536)))
        })
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .collect::<Vec<_>>();
    pairs.shuffle(&mut rng);
    pairs
}
