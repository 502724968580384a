/*!
 * Global install / query tests
 */

use crate::common::RecordingAllocator;
use datamem::{
    current_policy, install_policy, policy, query_current_policy_name, scoped_policy,
    DataMemError, HandleTable, RawHandler, ShiftAllocator, DEFAULT_HANDLER_NAME,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::Arc;

#[test]
#[serial]
fn test_install_then_query_then_reset() {
    let recorder = RecordingAllocator::new();
    install_policy(Some(recorder.table("recorder"))).unwrap();
    assert_eq!(query_current_policy_name(), "recorder");

    install_policy(None).unwrap();
    assert_eq!(query_current_policy_name(), DEFAULT_HANDLER_NAME);
    assert!(current_policy().is_none());
}

#[test]
#[serial]
fn test_install_returns_previous_in_order() {
    let recorder = RecordingAllocator::new();
    let a = recorder.table("a");
    let b = recorder.table("b");

    let first = install_policy(Some(a.clone())).unwrap();
    let second = install_policy(Some(b.clone())).unwrap();
    let third = install_policy(None).unwrap();

    assert!(first.is_none());
    assert!(Arc::ptr_eq(&second.unwrap(), &a));
    assert!(Arc::ptr_eq(&third.unwrap(), &b));
}

#[test]
#[serial]
fn test_missing_operation_rejected_and_previous_kept() {
    let shift = ShiftAllocator::new();
    install_policy(Some(shift.handler().unwrap())).unwrap();

    for missing in ["allocate", "zero_allocate", "deallocate", "reallocate"] {
        let mut raw = *shift.handler().unwrap().raw();
        match missing {
            "allocate" => raw.allocate = None,
            "zero_allocate" => raw.zero_allocate = None,
            "deallocate" => raw.deallocate = None,
            _ => raw.reallocate = None,
        }
        // ctx points at `shift`, which outlives the table
        let table = Arc::new(unsafe { HandleTable::from_raw(raw) });

        match install_policy(Some(table)) {
            Err(DataMemError::InvalidHandle { reason }) => {
                assert_eq!(reason, format!("{} is null", missing))
            }
            other => panic!("expected InvalidHandle, got {:?}", other),
        }
        assert_eq!(query_current_policy_name(), "shift");
    }

    install_policy(None).unwrap();
}

#[test]
#[serial]
fn test_over_length_name_rejected() {
    let recorder = RecordingAllocator::new();
    let long = "n".repeat(128);
    assert!(matches!(
        HandleTable::from_shared_allocator(&long, recorder),
        Err(DataMemError::InvalidHandle { .. })
    ));

    let mut raw = RawHandler::named("ok").unwrap();
    raw.name = [b'n'; 128];
    let table = Arc::new(unsafe { HandleTable::from_raw(raw) });
    assert!(install_policy(Some(table)).is_err());
    assert_eq!(query_current_policy_name(), DEFAULT_HANDLER_NAME);
}

#[test]
#[serial]
fn test_scoped_policy_restores_global() {
    let recorder = RecordingAllocator::new();
    {
        let _scope = scoped_policy(Some(recorder.table("scoped"))).unwrap();
        assert_eq!(query_current_policy_name(), "scoped");
    }
    assert_eq!(query_current_policy_name(), DEFAULT_HANDLER_NAME);
}

#[test]
#[serial]
fn test_swap_counter_advances() {
    let before = policy::global().swap_count();
    install_policy(None).unwrap();
    install_policy(None).unwrap();
    assert_eq!(policy::global().swap_count(), before + 2);
}
