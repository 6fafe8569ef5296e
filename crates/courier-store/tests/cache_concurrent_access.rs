//! Concurrency properties of the cache store, exercised with real threads
//! against a temporary directory.

use courier_store::{CacheStore, DeliveryCache};
use std::fs;
use std::io::Write;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn open_store() -> (tempfile::TempDir, Arc<CacheStore>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = CacheStore::open_shared(dir.path()).expect("open store");
    (dir, store)
}

/// Starts a write to `key` that stalls until `release` is signalled. Returns
/// once the write lock is held.
fn stalled_write(
    store: &Arc<CacheStore>,
    key: &'static str,
    value: &'static [u8],
) -> (mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let store = Arc::clone(store);
    let handle = thread::spawn(move || {
        store
            .write_with(key, |out| {
                out.write_all(&value[..value.len() / 2])?;
                entered_tx.send(()).ok();
                release_rx.recv().ok();
                out.write_all(&value[value.len() / 2..])
            })
            .expect("stalled write");
    });
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("writer entered");
    (release_tx, handle)
}

#[test]
fn test_read_blocks_during_write_then_sees_new_value() {
    let (_dir, store) = open_store();
    store.write("k", b"old-value").unwrap();

    let (release, writer) = stalled_write(&store, "k", b"new-value-complete");

    let (done_tx, done_rx) = mpsc::channel();
    let reader_store = Arc::clone(&store);
    let reader = thread::spawn(move || {
        let value = reader_store.read("k").expect("read");
        done_tx.send(value).ok();
    });

    // The reader must still be waiting while the writer holds the key.
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

    release.send(()).unwrap();
    let value = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("reader finished");
    assert_eq!(value.as_deref(), Some(&b"new-value-complete"[..]));

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_different_keys_do_not_block() {
    let (_dir, store) = open_store();
    store.write("other", b"x").unwrap();

    let (release, writer) = stalled_write(&store, "busy", b"0123456789");

    let start = Instant::now();
    store.write("other", b"y").unwrap();
    assert_eq!(store.read("other").unwrap().as_deref(), Some(&b"y"[..]));
    assert!(store.delete("other").unwrap());
    assert!(start.elapsed() < Duration::from_secs(1));

    release.send(()).unwrap();
    writer.join().unwrap();
    assert_eq!(
        store.read("busy").unwrap().as_deref(),
        Some(&b"0123456789"[..])
    );
}

#[test]
fn test_concurrent_reads_share_the_key() {
    let (_dir, store) = open_store();
    store.write("shared", b"payload").unwrap();

    let readers = 8;
    let barrier = Arc::new(Barrier::new(readers));
    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..50 {
                    assert_eq!(
                        store.read("shared").unwrap().as_deref(),
                        Some(&b"payload"[..])
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_writes_never_interleave() {
    let (_dir, store) = open_store();
    let writers = 6;
    let rounds = 40;
    let barrier = Arc::new(Barrier::new(writers + 1));

    let mut handles = Vec::new();
    for w in 0..writers {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let value = vec![b'a' + w as u8; 4096];
            for _ in 0..rounds {
                store.write("contended", &value).unwrap();
            }
        }));
    }

    let reader_store = Arc::clone(&store);
    let reader_barrier = Arc::clone(&barrier);
    let reader = thread::spawn(move || {
        reader_barrier.wait();
        for _ in 0..200 {
            if let Some(value) = reader_store.read("contended").unwrap() {
                assert_eq!(value.len(), 4096, "partial value observed");
                let first = value[0];
                assert!(value.iter().all(|b| *b == first), "interleaved value");
            }
        }
    });

    for handle in handles {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    let final_value = store.read("contended").unwrap().expect("value present");
    assert_eq!(final_value.len(), 4096);
    assert!(final_value.iter().all(|b| *b == final_value[0]));
}

#[test]
fn test_last_completed_write_wins() {
    let (_dir, store) = open_store();
    for i in 0..20u32 {
        store.write("seq", i.to_string().as_bytes()).unwrap();
    }
    assert_eq!(store.read("seq").unwrap().as_deref(), Some(&b"19"[..]));
}

#[test]
fn test_open_cleans_interrupted_writes() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = CacheStore::open(dir.path()).unwrap();
        store.write("session_s1", b"committed").unwrap();
    }
    // Simulate a process killed between creating the temp file and renaming.
    fs::write(dir.path().join(".session_s1.tmp.999.0"), b"half-writ").unwrap();
    fs::write(dir.path().join(".payload_x.tmp.999.1"), b"").unwrap();

    let cache = DeliveryCache::open(dir.path()).unwrap();
    assert_eq!(
        cache.load_session("s1").unwrap().as_deref(),
        Some(&b"committed"[..])
    );
    assert!(cache.payload_names().unwrap().is_empty());
    let hidden = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(hidden, 0);
}
