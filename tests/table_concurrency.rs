// ==============================================
// TABLE CONCURRENCY TESTS (integration)
// ==============================================
//
// Races the table's public operations against each other and against
// timer-driven expiry, then audits the structural invariants and the
// exchanger's exactly-once accounting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use memotable::Table;

#[derive(Default)]
struct Counters {
    inserts: AtomicUsize,
    replaces: AtomicUsize,
    releases: AtomicUsize,
}

fn counted_table(
    max_entries: usize,
    default_ttl: Duration,
) -> (Table<u64, u64>, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let sink = Arc::clone(&counters);
    let table = Table::with_exchanger(
        max_entries,
        default_ttl,
        move |_key: &u64, new: Option<&u64>, old: Option<&u64>, released: bool| {
            if released {
                sink.releases.fetch_add(1, Ordering::SeqCst);
            } else if new.is_some() && old.is_none() {
                sink.inserts.fetch_add(1, Ordering::SeqCst);
            } else {
                sink.replaces.fetch_add(1, Ordering::SeqCst);
            }
        },
    );
    (table, counters)
}

#[test]
fn racing_fetchers_agree_on_one_winner() {
    let num_threads = 64;
    let (table, counters) = counted_table(0, Duration::ZERO);
    let barrier = Arc::new(Barrier::new(num_threads));
    let winners = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..num_threads)
        .map(|i| {
            let table = table.clone();
            let barrier = Arc::clone(&barrier);
            let winners = Arc::clone(&winners);
            let observed = Arc::clone(&observed);
            thread::spawn(move || {
                barrier.wait();
                let (value, loaded) = table.fetch(42, i as u64);
                if !loaded {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                observed.lock().unwrap().push(*value);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1, "exactly one insert wins");
    assert_eq!(counters.inserts.load(Ordering::SeqCst), 1);
    assert_eq!(counters.releases.load(Ordering::SeqCst), 0);

    let observed = observed.lock().unwrap();
    let first = observed[0];
    assert!(
        observed.iter().all(|&value| value == first),
        "every caller saw the winner's value"
    );
    assert_eq!(table.get(&42).as_deref(), Some(&first));
}

#[test]
fn mixed_operation_storm_keeps_invariants() {
    let num_threads = 8;
    let ops_per_thread = 500;
    let key_space = 32u64;
    let (table, counters) = counted_table(16, Duration::ZERO);
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let table = table.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..ops_per_thread {
                    let key = ((thread_id * 31 + i * 7) as u64) % key_space;
                    match i % 5 {
                        0 => table.set(key, i as u64),
                        1 => {
                            table.get(&key);
                        },
                        2 => {
                            table.fetch(key, i as u64);
                        },
                        3 => {
                            table.keep_alive(&key);
                        },
                        _ => {
                            table.delete(&key);
                        },
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(table.check_invariants().is_ok());
    assert!(table.len() <= 16);

    // With no TTL in play, every insert is balanced by either a release
    // or an entry still resident in the table.
    let inserts = counters.inserts.load(Ordering::SeqCst);
    let releases = counters.releases.load(Ordering::SeqCst);
    assert_eq!(inserts - releases, table.len(), "exactly-once accounting");
}

#[test]
fn expiry_races_with_writers() {
    let num_threads = 4;
    let ops_per_thread = 200;
    let key_space = 16u64;
    let (table, counters) = counted_table(8, Duration::from_millis(20));
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let table = table.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..ops_per_thread {
                    let key = ((thread_id * 13 + i * 3) as u64) % key_space;
                    match i % 4 {
                        0 => table.set(key, i as u64),
                        1 => {
                            table.fetch(key, i as u64);
                        },
                        2 => {
                            table.get(&key);
                        },
                        _ => {
                            table.delete(&key);
                        },
                    }
                    if i % 50 == 0 {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Let every armed deadline lapse, then audit.
    thread::sleep(Duration::from_millis(300));
    assert!(table.check_invariants().is_ok());
    assert!(table.keys().is_empty(), "all survivors expired");

    let inserts = counters.inserts.load(Ordering::SeqCst);
    let releases = counters.releases.load(Ordering::SeqCst);
    assert_eq!(
        inserts - releases,
        table.len(),
        "exactly-once accounting under expiry races"
    );
}

#[test]
fn concurrent_clear_and_writers_release_everything_once() {
    let writer_threads = 4;
    let (table, counters) = counted_table(0, Duration::ZERO);
    let barrier = Arc::new(Barrier::new(writer_threads + 1));

    let mut handles: Vec<_> = (0..writer_threads)
        .map(|thread_id| {
            let table = table.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..200u64 {
                    table.set(thread_id as u64 * 1000 + i, i);
                }
            })
        })
        .collect();
    {
        let table = table.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..10 {
                table.clear();
                thread::sleep(Duration::from_millis(1));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    table.clear();

    assert!(table.is_empty());
    let inserts = counters.inserts.load(Ordering::SeqCst);
    let releases = counters.releases.load(Ordering::SeqCst);
    assert_eq!(inserts, releases, "every inserted entry released exactly once");
    assert!(table.check_invariants().is_ok());
}

#[test]
fn dropping_the_table_stops_its_timer_worker() {
    let table: Table<u64, u64> = Table::new(0, Duration::from_secs(120));
    for i in 0..100 {
        table.set(i, i);
    }
    // All 100 deadlines are far in the future; dropping the last handle
    // must not wait them out. The test harness times out if it does.
    drop(table);
}

#[test]
fn readers_and_writers_on_disjoint_keys_do_not_interfere() {
    let (table, _counters) = counted_table(0, Duration::ZERO);
    for i in 0..100u64 {
        table.set(i, i);
    }

    let successful_reads = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let table = table.clone();
        let successful_reads = Arc::clone(&successful_reads);
        handles.push(thread::spawn(move || {
            for i in 0..100u64 {
                if table.get(&i).is_some() {
                    successful_reads.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }
    for thread_id in 0..4u64 {
        let table = table.clone();
        handles.push(thread::spawn(move || {
            for i in 0..100u64 {
                table.set(1000 + thread_id * 100 + i, i);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(successful_reads.load(Ordering::SeqCst), 400);
    assert_eq!(table.len(), 500);
}
