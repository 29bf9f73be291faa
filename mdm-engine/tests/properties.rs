//! Property-based invariants

use chrono::{Datelike, NaiveTime, TimeZone, Timelike, Utc};
use mdm_engine::bootstrap::seed_core_tables;
use mdm_engine::config::WorkdayConfig;
use mdm_engine::scheduling::business_hours::add_working_seconds;
use mdm_engine::scheduling::calendar::FixedHolidayCalendar;
use mdm_engine::store::{MemoryBackend, RowStore, TableBackend};
use mdm_engine::timebase::SystemClock;
use mdm_engine::workload::{
    MemoryPropertyStore, PropertyStore, RequestNumberCounter, WorkloadRegistry,
};
use mdm_engine::LockManager;
use proptest::prelude::*;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn seeded_store() -> RowStore {
    let backend = Arc::new(MemoryBackend::new());
    seed_core_tables(&backend);
    let locks = LockManager::new(Arc::new(SystemClock));
    RowStore::new(backend as Arc<dyn TableBackend>, locks)
}

proptest! {
    /// Deadlines always land on a working day, inside the work window and
    /// outside the lunch break.
    #[test]
    fn deadlines_land_inside_the_work_window(
        start_minutes in 0i64..(60 * 24 * 21),
        seconds in 1i64..200_000,
    ) {
        let config = WorkdayConfig::default();
        let calendar = FixedHolidayCalendar::empty();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(start_minutes);
        let finished = add_working_seconds(start, seconds, &config, &calendar);
        let t = finished.naive_utc();

        prop_assert!(!matches!(t.date().weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun));
        let open = NaiveTime::from_hms_opt(config.start_hour, 0, 0).unwrap();
        let close = NaiveTime::from_hms_opt(config.end_hour, 0, 0).unwrap();
        prop_assert!(t.time() > open || t.time() == open);
        prop_assert!(t.time() <= close);
        // never strictly inside the lunch hour
        let lunch_open = NaiveTime::from_hms_opt(config.lunch_start_hour, 0, 0).unwrap();
        let lunch_close = NaiveTime::from_hms_opt(config.lunch_end_hour, 0, 0).unwrap();
        prop_assert!(!(t.time() > lunch_open && t.time() < lunch_close));
        prop_assert!(finished > start || t.hour() >= config.start_hour);
    }

    /// More work never finishes earlier.
    #[test]
    fn deadline_is_monotonic_in_seconds(
        start_minutes in 0i64..(60 * 24 * 14),
        first in 1i64..100_000,
        extra in 0i64..100_000,
    ) {
        let config = WorkdayConfig::default();
        let calendar = FixedHolidayCalendar::empty();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(start_minutes);
        let shorter = add_working_seconds(start, first, &config, &calendar);
        let longer = add_working_seconds(start, first + extra, &config, &calendar);
        prop_assert!(longer >= shorter);
    }

    /// The workload counter clamps at zero under any sequence of deltas.
    #[test]
    fn workload_seconds_never_negative(
        deltas in prop::collection::vec(-5_000i64..5_000, 1..30),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let registry = WorkloadRegistry::new(seeded_store());
            for delta in deltas {
                let total = registry.add("agent", delta).await.unwrap();
                assert!(total >= 0, "workload went negative: {}", total);
            }
            assert!(registry.get("agent").await.unwrap() >= 0);
        });
    }

    /// Request numbers are strictly monotonic per prefix within a run.
    #[test]
    fn request_numbers_are_strictly_monotonic(draws in 2usize..12) {
        let rt = runtime();
        rt.block_on(async {
            let store = seeded_store();
            let locks = LockManager::new(Arc::new(SystemClock));
            let counter = RequestNumberCounter::new(
                store,
                Arc::new(MemoryPropertyStore::new()) as Arc<dyn PropertyStore>,
                locks,
                Arc::new(SystemClock),
            );
            let mut last = 0i64;
            for _ in 0..draws {
                let number = counter.next("BOM", "BU-A").await;
                let suffix: i64 = number.rsplit('/').next().unwrap().parse().unwrap();
                assert!(suffix > last, "{} not after {}", suffix, last);
                last = suffix;
            }
        });
    }
}
