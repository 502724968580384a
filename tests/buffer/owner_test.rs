/*!
 * Buffer owner lifecycle tests
 */

use crate::common::{Call, RecordingAllocator};
use datamem::{BoundPolicy, BufferOwner, DataMemError, OwnerState, PolicyRegistry, RawParts};
use pretty_assertions::assert_eq;
use std::thread;

#[test]
fn test_lazy_bind_uses_policy_current_at_bind_time() {
    let registry = PolicyRegistry::new();
    let a = RecordingAllocator::new();
    let b = RecordingAllocator::new();

    registry.set(Some(a.table("a"))).unwrap();
    let mut owner = BufferOwner::unbound();
    let _scope = registry.scoped(Some(b.table("b"))).unwrap();

    owner.bind_zeroed_in(&registry, 3, 5).unwrap();
    assert_eq!(owner.bound_name(), "b");
    assert!(a.calls().is_empty());
    assert_eq!(b.calls(), vec![Call::ZeroAllocate(3, 5)]);
}

#[test]
fn test_release_then_drop_frees_once() {
    let t = RecordingAllocator::new();
    let table = t.table("T");
    let mut owner = BufferOwner::allocate_with(&table, 40).unwrap();

    owner.release().unwrap();
    assert_eq!(owner.state(), OwnerState::Freed);
    assert_eq!(owner.size(), 0);
    assert!(owner.handler().is_none());
    drop(owner);

    assert_eq!(t.deallocations(), vec![40]);
}

#[test]
fn test_unbound_release_and_resize() {
    let mut owner = BufferOwner::unbound();
    assert!(matches!(
        owner.resize(10),
        Err(DataMemError::InvalidState { .. })
    ));
    owner.release().unwrap();
    assert_eq!(owner.state(), OwnerState::Freed);
    assert!(matches!(
        owner.bind(8),
        Err(DataMemError::InvalidState { .. })
    ));
}

#[test]
fn test_table_outlives_registry_entry() {
    let registry = PolicyRegistry::new();
    let t = RecordingAllocator::new();
    registry.set(Some(t.table("T"))).unwrap();

    let owner = BufferOwner::allocate_in(&registry, 16).unwrap();
    // The registry drops its reference; the owner still holds one
    registry.set(None).unwrap();
    assert_eq!(owner.bound_name(), "T");
    drop(owner);

    assert_eq!(t.deallocations(), vec![16]);
}

#[test]
fn test_owner_freed_on_another_thread() {
    let t = RecordingAllocator::new();
    let table = t.table("T");
    let mut owner = BufferOwner::allocate_with(&table, 8).unwrap();
    owner.resize(24).unwrap();

    thread::spawn(move || drop(owner)).join().unwrap();
    assert_eq!(t.deallocations(), vec![24]);
}

#[test]
fn test_raw_parts_move_between_owners() {
    let t = RecordingAllocator::new();
    let table = t.table("T");
    let owner = BufferOwner::allocate_with(&table, 12).unwrap();

    let parts = owner.into_raw_parts().unwrap();
    assert_eq!(parts.size, 12);
    assert!(t.deallocations().is_empty());

    let mut adopted = unsafe { BufferOwner::from_raw_parts(parts) }.unwrap();
    adopted.resize(20).unwrap();
    drop(adopted);
    assert_eq!(t.deallocations(), vec![20]);
}

#[test]
fn test_replace_raw_validates_table() {
    let t = RecordingAllocator::new();
    let table = t.table("T");
    let mut owner = BufferOwner::allocate_with(&table, 4).unwrap();
    let data = owner.data().unwrap();

    let broken = std::sync::Arc::new(unsafe {
        datamem::HandleTable::from_raw(datamem::RawHandler::named("broken").unwrap())
    });
    let err = unsafe { owner.replace_raw(data, 4, broken) }.unwrap_err();
    assert!(matches!(err, DataMemError::InvalidHandle { .. }));
    assert_eq!(owner.bound_name(), "T");
}

#[test]
fn test_from_raw_parts_validates_table() {
    let t = RecordingAllocator::new();
    let table = t.table("T");
    let parts = BufferOwner::allocate_with(&table, 10)
        .unwrap()
        .into_raw_parts()
        .unwrap();
    let data = parts.data;

    let broken = std::sync::Arc::new(unsafe {
        datamem::HandleTable::from_raw(datamem::RawHandler::named("broken").unwrap())
    });
    let rejected = RawParts {
        data,
        size: 10,
        handler: broken,
    };
    let err = unsafe { BufferOwner::from_raw_parts(rejected) }.unwrap_err();
    assert!(matches!(err, DataMemError::InvalidHandle { .. }));

    // Still ours to free through the table that produced it
    let restored = RawParts {
        data,
        size: 10,
        handler: table,
    };
    drop(unsafe { BufferOwner::from_raw_parts(restored) }.unwrap());
    assert_eq!(t.deallocations(), vec![10]);
}
