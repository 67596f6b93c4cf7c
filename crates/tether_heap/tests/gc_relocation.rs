use rayon::prelude::*;
use std::sync::Arc;
use tether_core::{Boxing, ForeignRuntime, GcPause, Proxy, Sentinel};
use tether_heap::{HeapSettings, ManagedRuntime};

fn setup(collect_threshold: usize) -> (Arc<ManagedRuntime>, Arc<Sentinel>) {
    let runtime = ManagedRuntime::started(HeapSettings {
        collect_threshold,
        ..HeapSettings::default()
    });
    let sentinel = Sentinel::new(runtime.clone()).unwrap();
    (runtime, sentinel)
}

#[test]
fn thousand_aliases_survive_a_collection() {
    let (runtime, sentinel) = setup(0);
    let root = sentinel.new_value(&vec![4i64, 5, 6]).unwrap();
    let id = root.anchor().id();

    let aliases: Vec<Proxy> = (0..1000).into_par_iter().map(|_| root.clone()).collect();
    assert_eq!(sentinel.registry().count(id), 1001);

    let before = root.anchor().raw().unwrap();
    sentinel.collect_garbage();
    let after = root.anchor().raw().unwrap();

    assert_ne!(before, after);
    assert!(!runtime.is_live(before));
    assert!(aliases
        .par_iter()
        .all(|alias| alias.unbox_as::<Vec<i64>>() == Ok(vec![4, 5, 6])));
    assert!(aliases
        .iter()
        .all(|alias| alias.anchor().raw() == Ok(after)));

    drop(aliases);
    assert_eq!(sentinel.registry().count(id), 1);
}

#[test]
fn relocated_value_still_equals_its_old_self() {
    let (_runtime, sentinel) = setup(0);
    let value = sentinel.new_value(&vec![1.5f64, 2.5]).unwrap();
    let witness = sentinel.new_value(&vec![1.5f64, 2.5]).unwrap();
    assert!(value.equals(&witness).unwrap());

    for _ in 0..3 {
        sentinel.collect_garbage();
    }

    assert!(value.equals(&witness).unwrap());
    let stats = sentinel.registry().stats();
    assert_eq!(stats.entries, 2);
    if tether_metrics::ENABLED {
        assert_eq!(stats.gc_cycles, 3);
        assert_eq!(stats.relocated, 6);
    }
}

#[test]
fn derived_reads_follow_relocation_without_caching() {
    let (_runtime, sentinel) = setup(0);
    let main = sentinel.main().unwrap();
    main.field("xs").set(&vec![1i64, 2, 3]).unwrap();
    let second = main.field("xs").index(1);

    let first_read = second.resolve_value().unwrap();
    sentinel.collect_garbage();
    main.field("xs").index(1).set(&20i64).unwrap();

    assert_eq!(second.unbox_as::<i64>().unwrap(), 20);
    // The earlier pin still names the value it resolved to.
    assert_eq!(first_read.unbox::<i64>().unwrap(), 2);
}

#[test]
fn collection_waits_for_the_safepoint_to_end() {
    let (runtime, sentinel) = setup(0);
    let garbage = runtime.to_foreign(&tether_core::Value::Int(1)).unwrap();

    {
        let _safepoint = sentinel.enter().unwrap();
        assert!(!runtime.gc_enabled());
        {
            let pause = GcPause::new(runtime.as_ref());
            assert!(!pause.was_enabled());
        }
        assert!(!runtime.gc_enabled());

        sentinel.collect_garbage();
        assert!(runtime.is_live(garbage));
        assert_eq!(runtime.stats().collections, 0);
    }

    assert!(runtime.gc_enabled());
    assert!(!runtime.is_live(garbage));
    assert_eq!(runtime.stats().collections, 1);
}

#[test]
fn allocation_pressure_never_invalidates_pins() {
    let (runtime, sentinel) = setup(16);
    let main = sentinel.main().unwrap();
    let mut held = Vec::new();

    for i in 0..200i64 {
        let proxy = sentinel.new_value(&vec![i, i + 1]).unwrap();
        main.field("latest").set(&i).unwrap();
        held.push(proxy);
    }

    assert!(runtime.stats().collections > 0);
    for (i, proxy) in held.iter().enumerate() {
        let i = i as i64;
        assert_eq!(proxy.unbox_as::<Vec<i64>>().unwrap(), vec![i, i + 1]);
    }
    assert_eq!(main.field("latest").unbox_as::<i64>().unwrap(), 199);
}

#[test]
fn concurrent_readers_and_collections() {
    let (_runtime, sentinel) = setup(8);
    let root = sentinel
        .new_value(&vec!["a".to_string(), "b".to_string()])
        .unwrap();

    (0..64).into_par_iter().for_each(|i| {
        let mine = root.clone();
        let scratch = sentinel.new_value(&vec![i as i64; 4]).unwrap();
        if i % 8 == 0 {
            sentinel.collect_garbage();
        }
        assert_eq!(mine.index(1).unbox_as::<String>().unwrap(), "b");
        assert_eq!(scratch.index(3).unbox_as::<i64>().unwrap(), i as i64);
    });

    assert_eq!(sentinel.registry().count(root.anchor().id()), 1);
}
