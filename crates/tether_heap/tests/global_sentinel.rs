//! The process-wide sentinel is shared state, so everything touching it
//! lives in this one test.

use tether_core::{sentinel, ForeignRuntime, Proxy, ProxyError, RawValue};
use tether_heap::{HeapSettings, ManagedRuntime};

#[test]
fn install_current_shutdown_lifecycle() {
    assert_eq!(
        sentinel::current().unwrap_err(),
        ProxyError::ForeignRuntimeNotInitialized
    );
    assert_eq!(
        Proxy::from_foreign(RawValue::from_bits(0x1000)).unwrap_err(),
        ProxyError::ForeignRuntimeNotInitialized
    );

    let runtime = ManagedRuntime::started(HeapSettings::default());
    let installed = sentinel::install(runtime.clone()).unwrap();
    assert_eq!(
        sentinel::install(runtime.clone()).unwrap_err(),
        ProxyError::RuntimeAlreadyBound
    );

    let main = {
        let current = sentinel::current().unwrap();
        let _safepoint = current.enter().unwrap();
        let raw = runtime.main_module().unwrap();
        Proxy::from_foreign(raw).unwrap()
    };
    assert_eq!(main.type_name().unwrap(), "Module");
    assert!(installed.registry().is_pinned(main.anchor().id()));

    let torn_down = sentinel::shutdown().unwrap();
    assert!(std::sync::Arc::ptr_eq(&torn_down, &installed));
    assert!(sentinel::shutdown().is_none());
    assert!(sentinel::current().is_err());

    // Proxies made before teardown keep their own sentinel.
    assert_eq!(main.field_names().unwrap(), Vec::<String>::new());
    drop(main);
    assert!(installed.registry().is_empty());

    // The runtime stays bound until the last reference to the old sentinel goes.
    drop(torn_down);
    assert_eq!(
        sentinel::install(runtime.clone()).unwrap_err(),
        ProxyError::RuntimeAlreadyBound
    );
    drop(installed);
    let reinstalled = sentinel::install(runtime.clone()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&sentinel::current().unwrap(), &reinstalled));
    assert!(sentinel::shutdown().is_some());
}
