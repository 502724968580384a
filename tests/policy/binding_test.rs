/*!
 * Per-buffer binding tests
 *
 * A buffer keeps the table it was allocated with for its whole life,
 * whatever the registry holds later.
 */

use crate::common::{Call, RecordingAllocator};
use datamem::monitoring::TraceKind;
use datamem::{
    init_tracker, install_policy, query_current_policy_name, query_object_policy_name,
    AllocationTracker, BufferOwner, DataArray, DataMemError, PolicyRegistry, ShiftAllocator,
    DEFAULT_HANDLER_NAME,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn test_binding_captured_at_creation() {
    let t = RecordingAllocator::new();
    let u = RecordingAllocator::new();

    install_policy(Some(t.table("T"))).unwrap();
    let mut array = DataArray::zeros(16, 8).unwrap();
    install_policy(Some(u.table("U"))).unwrap();

    assert_eq!(query_object_policy_name(&array), "T");
    assert_eq!(query_current_policy_name(), "U");

    array.resize(32).unwrap();
    drop(array);

    assert_eq!(
        t.calls(),
        vec![
            Call::ZeroAllocate(16, 8),
            Call::Reallocate(256),
            Call::Deallocate(256)
        ]
    );
    assert!(u.calls().is_empty());

    install_policy(None).unwrap();
}

#[test]
#[serial]
fn test_shift_scenario() {
    let tracker = init_tracker(AllocationTracker::new());
    tracker.drain_events();

    let shift = ShiftAllocator::new();
    install_policy(Some(shift.handler().unwrap())).unwrap();

    let first = DataArray::zeros(100, 8).unwrap();
    assert_eq!(query_object_policy_name(&first), "shift");

    install_policy(None).unwrap();
    let second = DataArray::zeros(50, 8).unwrap();
    assert_eq!(query_object_policy_name(&second), DEFAULT_HANDLER_NAME);
    assert_eq!(query_object_policy_name(&first), "shift");

    let second_address = second.owner().as_ptr() as usize;
    assert_eq!(tracker.size_of(second_address), Some(400));
    assert!(!tracker.is_live(first.owner().as_ptr() as usize));

    drop(second);
    drop(first);

    // The shift table freed only its own array, with its own size
    let stats = shift.stats();
    let freed = shift.take_freed_sizes();
    assert_eq!(freed, vec![800]);
    assert!(!freed.contains(&400));
    assert_eq!(stats.zero_allocations, 1);
    assert_eq!(stats.deallocations, 1);
    assert_eq!(stats.size_mismatches, 0);

    // The default table freed the second array with 400
    let default_frees: Vec<_> = tracker
        .drain_events()
        .into_iter()
        .filter(|e| e.kind == TraceKind::Free && e.address == second_address)
        .map(|e| e.size)
        .collect();
    assert_eq!(default_frees, vec![400]);
}

#[test]
#[serial]
fn test_view_reports_base_binding() {
    let t = RecordingAllocator::new();
    install_policy(Some(t.table("T"))).unwrap();
    let array = DataArray::from_bytes(&[1, 2, 3, 4], 1).unwrap();
    install_policy(None).unwrap();

    let view = array.view(1..3).unwrap();
    assert_eq!(query_object_policy_name(&view), "T");
    drop(array);
    assert_eq!(query_object_policy_name(&view), "T");
    assert!(t.deallocations().is_empty());

    drop(view);
    assert_eq!(t.deallocations(), vec![4]);
}

#[test]
fn test_resize_failure_leaves_buffer_untouched() {
    let registry = PolicyRegistry::new();
    let t = RecordingAllocator::new();
    registry.set(Some(t.table("T"))).unwrap();

    let mut array = DataArray::from_bytes_in(&registry, &[9, 8, 7, 6], 2).unwrap();
    let before = array.owner().as_ptr();
    t.fail_reallocations(true);

    assert_eq!(
        array.resize(1000).unwrap_err(),
        DataMemError::OutOfMemory {
            requested: 2000,
            policy: "T".to_string()
        }
    );
    assert_eq!(array.len(), 2);
    assert_eq!(array.as_bytes(), &[9, 8, 7, 6]);
    assert_eq!(array.owner().size(), 4);
    assert_eq!(array.owner().as_ptr(), before);

    t.fail_reallocations(false);
    drop(array);
    assert_eq!(t.deallocations(), vec![4]);
}

#[test]
fn test_allocation_failure_binds_nothing() {
    let registry = PolicyRegistry::new();
    let t = RecordingAllocator::new();
    registry.set(Some(t.table("T"))).unwrap();
    t.fail_allocations(true);

    let mut owner = BufferOwner::unbound();
    assert!(matches!(
        owner.bind_in(&registry, 64),
        Err(DataMemError::OutOfMemory { requested: 64, .. })
    ));
    assert_eq!(owner.state(), datamem::OwnerState::Unbound);

    assert!(DataArray::zeros_in(&registry, 8, 8).is_err());
    drop(owner);
    assert!(t.deallocations().is_empty());
}

#[test]
fn test_round_trip_size_passed_to_deallocate() {
    let t = RecordingAllocator::new();
    let table = t.table("T");

    let mut owner = BufferOwner::allocate_with(&table, 100).unwrap();
    owner.resize(250).unwrap();
    drop(owner);

    assert_eq!(t.deallocations(), vec![250]);
}

proptest! {
    #[test]
    fn prop_deallocate_gets_last_recorded_size(
        initial in 0usize..4096,
        resizes in proptest::collection::vec(0usize..4096, 0..8),
    ) {
        let t = RecordingAllocator::new();
        let table = t.table("T");

        let mut owner = BufferOwner::allocate_with(&table, initial).unwrap();
        for &size in &resizes {
            owner.resize(size).unwrap();
        }
        let expected = resizes.last().copied().unwrap_or(initial).max(1);
        prop_assert_eq!(owner.size(), expected);
        drop(owner);

        prop_assert_eq!(t.deallocations(), vec![expected]);
        prop_assert_eq!(t.reallocations().len(), resizes.len());
    }

    #[test]
    fn prop_shift_header_matches_on_free(
        len in 0usize..512,
        elem in 1usize..16,
        new_len in 0usize..512,
    ) {
        let shift = ShiftAllocator::new();
        let registry = PolicyRegistry::new();
        registry.set(Some(shift.handler().unwrap())).unwrap();

        let mut array = DataArray::zeros_in(&registry, len, elem).unwrap();
        array.resize(new_len).unwrap();
        drop(array);

        prop_assert_eq!(shift.stats().size_mismatches, 0);
        prop_assert_eq!(shift.stats().deallocations, 1);
    }
}
