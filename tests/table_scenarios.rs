// ==============================================
// TABLE SCENARIO TESTS (integration)
// ==============================================
//
// End-to-end behavior of the table across eviction, expiry, refresh,
// and release notification, driven through the public API only. Timing
// margins are generous: deadlines are hundreds of milliseconds and
// assertions sit well away from the boundaries.

use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

use memotable::{KeepAliveOptions, SetOptions, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Event {
    key: &'static str,
    new: Option<u32>,
    old: Option<u32>,
    released: bool,
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn releases(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.released)
            .collect()
    }

    fn releases_for(&self, key: &str) -> usize {
        self.releases()
            .iter()
            .filter(|event| event.key == key)
            .count()
    }
}

fn recorded_table(
    max_entries: usize,
    default_ttl: Duration,
) -> (Table<&'static str, u32>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let sink = Arc::clone(&recorder);
    let table = Table::with_exchanger(
        max_entries,
        default_ttl,
        move |key: &&'static str, new: Option<&u32>, old: Option<&u32>, released: bool| {
            sink.events.lock().unwrap().push(Event {
                key: *key,
                new: new.copied(),
                old: old.copied(),
                released,
            });
        },
    );
    (table, recorder)
}

mod lru_eviction {
    use super::*;

    #[test]
    fn eviction_releases_the_least_recent_key() {
        let (table, recorder) = recorded_table(3, Duration::ZERO);
        table.set("a", 1);
        table.set("b", 2);
        table.set("c", 3);

        // Touching "a" leaves "b" as the oldest.
        assert_eq!(table.get(&"a").as_deref(), Some(&1));
        table.set("d", 4);

        let releases = recorder.releases();
        assert_eq!(releases.len(), 1);
        assert_eq!(
            releases[0],
            Event {
                key: "b",
                new: None,
                old: Some(2),
                released: true
            }
        );

        let mut keys = table.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "c", "d"]);
        assert!(table.check_invariants().is_ok());
    }

    #[test]
    fn overflow_by_many_releases_each_victim_once() {
        let (table, recorder) = recorded_table(2, Duration::ZERO);
        for (key, value) in [("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)] {
            table.set(key, value);
        }

        assert_eq!(table.len(), 2);
        for key in ["a", "b", "c"] {
            assert_eq!(recorder.releases_for(key), 1, "{key} released exactly once");
        }
    }
}

mod ttl_expiry {
    use super::*;

    #[test]
    fn expiry_fires_release_and_get_misses() {
        let (table, recorder) = recorded_table(0, Duration::from_millis(100));
        table.set("x", 1);

        sleep(Duration::from_millis(500));

        assert_eq!(
            recorder.releases(),
            vec![Event {
                key: "x",
                new: None,
                old: Some(1),
                released: true
            }]
        );
        assert!(table.get(&"x").is_none());
        assert!(table.keys().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn keep_alive_defeats_expiry() {
        let (table, recorder) = recorded_table(0, Duration::from_millis(600));
        table.set("x", 1);

        sleep(Duration::from_millis(300));
        assert!(table.keep_alive(&"x"), "refresh while still live");

        // Past the original deadline, inside the refreshed one.
        sleep(Duration::from_millis(400));
        assert_eq!(table.get(&"x").as_deref(), Some(&1));
        assert!(recorder.releases().is_empty(), "no release yet");

        // Past the refreshed deadline.
        sleep(Duration::from_millis(600));
        assert!(table.get(&"x").is_none());
        assert_eq!(recorder.releases_for("x"), 1);
    }

    #[test]
    fn fetch_hit_rearms_the_deadline() {
        let (table, recorder) = recorded_table(0, Duration::from_millis(600));
        table.set("x", 1);

        sleep(Duration::from_millis(300));
        let (value, loaded) = table.fetch("x", 99);
        assert_eq!(*value, 1);
        assert!(loaded);

        sleep(Duration::from_millis(400));
        assert_eq!(
            table.get(&"x").as_deref(),
            Some(&1),
            "fetch hit pushed the deadline out"
        );
        assert!(recorder.releases().is_empty());
    }

    #[test]
    fn stale_timer_after_delete_is_ignored() {
        let (table, recorder) = recorded_table(0, Duration::from_millis(300));
        table.set("x", 1);

        sleep(Duration::from_millis(100));
        assert!(table.delete(&"x"));
        assert_eq!(recorder.releases_for("x"), 1);

        // Wait past the original deadline; the armed callback fires into
        // a released entry and must not produce a second release.
        sleep(Duration::from_millis(500));
        assert_eq!(recorder.releases_for("x"), 1);
        assert!(table.keys().is_empty());
    }

    #[test]
    fn stale_timer_cannot_touch_a_recycled_slot() {
        let (table, recorder) = recorded_table(0, Duration::from_millis(200));
        table.set("x", 1);
        sleep(Duration::from_millis(50));

        // Delete and immediately repopulate the same key; the recycled
        // entry carries a fresh generation with a long deadline.
        assert!(table.delete(&"x"));
        table.set_with("x", 2, SetOptions::default().keep_alive(Duration::from_secs(60)));

        // The first insertion's timer lapses harmlessly.
        sleep(Duration::from_millis(400));
        assert_eq!(table.get(&"x").as_deref(), Some(&2));
        assert_eq!(recorder.releases_for("x"), 1, "only the explicit delete released");
    }

    #[test]
    fn zero_ttl_override_clears_the_deadline() {
        let (table, recorder) = recorded_table(0, Duration::from_millis(200));
        table.set("x", 1);

        let cleared = table.keep_alive_with(
            &"x",
            KeepAliveOptions::default().duration(Duration::ZERO),
        );
        assert!(cleared);

        sleep(Duration::from_millis(500));
        assert_eq!(table.get(&"x").as_deref(), Some(&1), "no deadline anymore");
        assert!(recorder.releases().is_empty());
    }

    #[test]
    fn set_ttl_override_takes_precedence() {
        let (table, _recorder) = recorded_table(0, Duration::from_secs(60));
        table.set_with(
            "short",
            1,
            SetOptions::default().keep_alive(Duration::from_millis(100)),
        );
        table.set("long", 2);

        sleep(Duration::from_millis(500));
        assert!(table.get(&"short").is_none());
        assert_eq!(table.get(&"long").as_deref(), Some(&2));
    }

    #[test]
    fn keys_filters_expired_entries() {
        let (table, _recorder) = recorded_table(0, Duration::ZERO);
        table.set("keep", 1);
        table.set_with(
            "lapse",
            2,
            SetOptions::default().keep_alive(Duration::from_millis(100)),
        );

        sleep(Duration::from_millis(400));
        assert_eq!(table.keys(), vec!["keep"]);
    }
}

mod clear {
    use super::*;

    #[test]
    fn clear_releases_every_entry_and_defuses_timers() {
        let (table, recorder) = recorded_table(0, Duration::from_millis(200));
        for i in 0..50u32 {
            table.set(KEYS[i as usize], i);
        }

        table.clear();
        assert!(table.is_empty());
        assert!(table.keys().is_empty());
        assert_eq!(recorder.releases().len(), 50, "one release per entry");

        // Armed timers lapse without effect on the cleared table.
        sleep(Duration::from_millis(500));
        assert_eq!(recorder.releases().len(), 50);
        assert!(table.check_invariants().is_ok());
    }

    // Fixed key set so the exchanger can borrow &'static str keys.
    const KEYS: [&str; 50] = [
        "k00", "k01", "k02", "k03", "k04", "k05", "k06", "k07", "k08", "k09", "k10", "k11", "k12",
        "k13", "k14", "k15", "k16", "k17", "k18", "k19", "k20", "k21", "k22", "k23", "k24", "k25",
        "k26", "k27", "k28", "k29", "k30", "k31", "k32", "k33", "k34", "k35", "k36", "k37", "k38",
        "k39", "k40", "k41", "k42", "k43", "k44", "k45", "k46", "k47", "k48", "k49",
    ];
}

mod notification_order {
    use super::*;

    #[test]
    fn lifetime_of_a_key_is_insert_updates_release() {
        let (table, recorder) = recorded_table(0, Duration::ZERO);
        table.set("a", 1);
        table.set("a", 2);
        let (_, loaded) = table.fetch("a", 3);
        assert!(loaded);
        table.delete(&"a");

        let events: Vec<(bool, Option<u32>)> = recorder
            .events()
            .into_iter()
            .map(|event| (event.released, event.new))
            .collect();
        assert_eq!(
            events,
            vec![
                (false, Some(1)), // insert
                (false, Some(2)), // replace report (value not stored)
                (true, None),     // release
            ]
        );
    }

    #[test]
    fn stored_value_survives_set_on_present_key() {
        let (table, _recorder) = recorded_table(0, Duration::ZERO);
        table.set("a", 1);
        table.set("a", 2);
        table.set("a", 3);

        assert_eq!(
            table.get(&"a").as_deref(),
            Some(&1),
            "set is exchanger-write-through; the cache keeps the first value"
        );
    }
}
