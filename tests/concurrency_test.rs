//! Concurrent access to the resource cache

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use wikit_engine::{ErrorKind, MatchKind, QueryService};

const THREADS: usize = 8;

#[test]
fn test_concurrent_first_loads_coalesce() {
    let root = tempfile::tempdir().unwrap();
    install_basic_en(root.path());
    let service = QueryService::new(&config_for(root.path())).unwrap();
    let barrier = Barrier::new(THREADS);

    let loaded: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    service.cache().resource_for("basic-en").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(service.cache().load_count("basic-en"), 1);
    assert!(loaded.iter().all(|dict| Arc::ptr_eq(dict, &loaded[0])));
}

#[test]
fn test_lookups_on_two_dictionaries_interleave() {
    let root = tempfile::tempdir().unwrap();
    install_basic_en(root.path());
    install_oxford(root.path(), &MdictBuilder::mdx("Oxford Fruit").zlib_records());
    let service = QueryService::new(&config_for(root.path())).unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for i in 0..THREADS {
            let service = &service;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    let (dictid, word, expected) = if i % 2 == 0 {
                        ("basic-en", "Hello", "a greeting")
                    } else {
                        ("oxford", "apple", "a round fruit")
                    };
                    let definition = service.lookup(dictid, word).unwrap();
                    assert_eq!(definition.match_kind, MatchKind::Exact);
                    assert!(definition.html.contains(expected));
                }
            });
        }
    });

    assert_eq!(service.cache().load_count("basic-en"), 1);
    assert_eq!(service.cache().load_count("oxford"), 1);
}

#[test]
fn test_failed_load_is_shared_by_waiters() {
    let root = tempfile::tempdir().unwrap();
    install_basic_en(root.path());
    let valid = MdictBuilder::mdx("Broken").build(OXFORD_ENTRIES);
    install(
        root.path(),
        "broken",
        &manifest("broken", "Broken", "mdx"),
        &[("broken.mdx", &valid[..valid.len() / 2])],
    );
    let service = QueryService::new(&config_for(root.path())).unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for i in 0..THREADS {
            let service = &service;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    let err = service.lookup("broken", "apple").unwrap_err();
                    assert_eq!(err.kind, ErrorKind::FormatParse);
                } else {
                    assert!(service.lookup("basic-en", "hello").is_ok());
                }
            });
        }
    });

    assert_eq!(service.cache().load_count("broken"), 1);
}

#[test]
fn test_shared_service_across_threads() {
    let root = tempfile::tempdir().unwrap();
    install_basic_en(root.path());
    let service = Arc::new(QueryService::new(&config_for(root.path())).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.lookup_json("basic-en", "world"))
        })
        .collect();
    let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(outputs.iter().all(|o| o == &outputs[0]));
    assert!(outputs[0].starts_with("{\"status\":\"ok\""));
}
