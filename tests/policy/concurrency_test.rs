/*!
 * Concurrent swap tests
 * Readers and allocators racing a thread that keeps swapping the global slot
 */

use crate::common::{Call, RecordingAllocator};
use datamem::{
    install_policy, query_current_policy_name, query_object_policy_name, DataArray,
    DEFAULT_HANDLER_NAME,
};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const ROUNDS: usize = 2_000;

#[test]
#[serial]
fn test_swaps_never_tear_and_frees_follow_binding() {
    let a = RecordingAllocator::new();
    let b = RecordingAllocator::new();
    let table_a = a.table("a");
    let table_b = b.table("b");
    let stop = Arc::new(AtomicBool::new(false));

    let swapper = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let next = match i % 3 {
                    0 => Some(table_a.clone()),
                    1 => Some(table_b.clone()),
                    _ => None,
                };
                install_policy(next).unwrap();
                i += 1;
            }
        })
    };

    let workers: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                for _ in 0..ROUNDS {
                    let name = query_current_policy_name();
                    assert!(
                        ["a", "b", DEFAULT_HANDLER_NAME].contains(&name.as_str()),
                        "torn policy name: {}",
                        name
                    );

                    let mut array = DataArray::zeros(4, 8).unwrap();
                    let bound = query_object_policy_name(&array).to_string();
                    array.resize(8).unwrap();
                    assert_eq!(query_object_policy_name(&array), bound);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    swapper.join().unwrap();
    install_policy(None).unwrap();

    for recorder in [&a, &b] {
        let calls = recorder.calls();
        let allocated = calls
            .iter()
            .filter(|c| matches!(c, Call::ZeroAllocate(4, 8)))
            .count();
        let resized = calls.iter().filter(|c| **c == Call::Reallocate(64)).count();
        let freed = calls.iter().filter(|c| **c == Call::Deallocate(64)).count();
        assert_eq!(allocated, resized);
        assert_eq!(allocated, freed);
    }
}
