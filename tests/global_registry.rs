//! Process-wide singleton API.
//!
//! Lives in its own integration-test binary: the global registry can only be
//! initialized once per process.

use std::sync::Arc;

use frame_registry::{FrametableBuilder, RegistryConfig, SingleUnitWorld};

#[test]
fn global_init_register_find_unregister() {
    let mut builder = FrametableBuilder::new();
    builder.push_frame(0x1000, &[8]);
    let initial = builder.finish();

    unsafe {
        frame_registry::init(
            RegistryConfig::default(),
            Arc::new(SingleUnitWorld),
            &[initial.table()],
        )
    }
    .unwrap();

    let handle = frame_registry::get_table_handle();
    assert_eq!(handle.record_count(), 1);
    assert!(frame_registry::find(0x1000).is_some());
    assert!(frame_registry::find(0x2000).is_none());

    let mut builder = FrametableBuilder::new();
    builder.push_frame(0x2000, &[16]);
    let loaded = builder.finish();

    unsafe { frame_registry::register_frametable(loaded.table()) }.unwrap();
    assert!(frame_registry::find(0x2000).is_some());

    unsafe { frame_registry::unregister_frametable(loaded.table()) };
    drop(loaded);
    assert!(frame_registry::find(0x2000).is_none());
    assert!(frame_registry::find(0x1000).is_some());

    // The handle keeps working without re-resolving global state.
    assert_eq!(handle.record_count(), 1);
}
