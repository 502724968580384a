/*!
 * Host array and view tests
 */

use crate::common::{Call, RecordingAllocator};
use datamem::{query_object_policy_name, DataArray, DataMemError, PolicyRegistry};
use pretty_assertions::assert_eq;

fn registry_with(name: &str) -> (PolicyRegistry, std::sync::Arc<RecordingAllocator>) {
    let registry = PolicyRegistry::new();
    let recorder = RecordingAllocator::new();
    registry.set(Some(recorder.table(name))).unwrap();
    (registry, recorder)
}

#[test]
fn test_shared_buffer_cannot_be_resized() {
    let (registry, t) = registry_with("T");
    let mut array = DataArray::from_bytes_in(&registry, &[1, 2, 3, 4, 5, 6, 7, 8], 4).unwrap();
    let view = array.view(0..1).unwrap();

    assert_eq!(
        array.resize(10),
        Err(DataMemError::BufferShared { references: 1 })
    );
    assert_eq!(t.calls(), vec![Call::Allocate(8)]);

    drop(view);
    array.resize(3).unwrap();
    assert_eq!(array.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]);
    assert_eq!(t.reallocations(), vec![12]);
}

#[test]
fn test_views_never_allocate_or_free() {
    let (registry, t) = registry_with("T");
    let array = DataArray::zeros_in(&registry, 10, 2).unwrap();
    let views: Vec<_> = (0..5).map(|i| array.view(i..i + 2).unwrap()).collect();
    let narrower = views[0].slice(1, 2).unwrap();

    assert_eq!(array.references(), 6);
    drop(views);
    drop(array);
    assert!(t.deallocations().is_empty());
    assert_eq!(query_object_policy_name(&narrower), "T");

    drop(narrower);
    assert_eq!(t.deallocations(), vec![20]);
    assert_eq!(t.calls().len(), 2);
}

#[test]
fn test_shrink_to_empty_and_regrow() {
    let (registry, t) = registry_with("T");
    let mut array = DataArray::filled_in(&registry, 4, &[5, 5]).unwrap();

    array.resize(0).unwrap();
    assert!(array.is_empty());
    assert_eq!(array.owner().size(), 1);

    array.resize(2).unwrap();
    assert_eq!(array.as_bytes(), &[0, 0, 0, 0]);
    drop(array);
    assert_eq!(t.reallocations(), vec![1, 4]);
    assert_eq!(t.deallocations(), vec![4]);
}

#[test]
fn test_mutation_visible_through_later_views() {
    let (registry, _t) = registry_with("T");
    let mut array = DataArray::zeros_in(&registry, 4, 1).unwrap();
    array.as_bytes_mut().unwrap().copy_from_slice(b"wxyz");
    let view = array.view(2..4).unwrap();
    assert_eq!(view.as_bytes(), b"yz");
}

#[test]
fn test_size_overflow_reported() {
    let (registry, t) = registry_with("T");
    assert_eq!(
        DataArray::zeros_in(&registry, usize::MAX / 2, 4).unwrap_err(),
        DataMemError::SizeOverflow {
            count: usize::MAX / 2,
            elem_size: 4
        }
    );
    assert!(t.calls().is_empty());

    let mut array = DataArray::zeros_in(&registry, 1, 8).unwrap();
    assert!(matches!(
        array.resize(usize::MAX),
        Err(DataMemError::SizeOverflow { .. })
    ));
    assert_eq!(array.len(), 1);
}
