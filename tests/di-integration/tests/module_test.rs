//! 模块导入与容器继承的集成测试

use di_core::{tag, Di, DiModule};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Service {
    label: String,
}

impl Service {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_owned(),
        }
    }
}

#[test]
fn test_module_bindings_available_after_import() {
    let module = DiModule::new("services", |builder| {
        builder.bind_singleton(None, |_| Ok(Service::new("module")))
    });
    let di = Di::new(|builder| builder.import(&module)).unwrap();
    let service: Arc<Service> = di.instance(None).unwrap();
    assert_eq!(service.label, "module");
}

#[test]
fn test_repeated_import_is_silent_noop() {
    let applied = Arc::new(AtomicUsize::new(0));
    let counter = applied.clone();
    let module = DiModule::new("once", move |builder| {
        counter.fetch_add(1, Ordering::SeqCst);
        builder.bind_singleton(None, |_| Ok(Service::new("once")))
    });
    let di = Di::new(|builder| {
        builder.import(&module)?;
        builder.import(&module)?;
        builder.import(&module)
    })
    .unwrap();
    assert_eq!(applied.load(Ordering::SeqCst), 1);
    assert!(di.has_provider::<Service>(None));
}

#[test]
fn test_repeated_import_keeps_eager_singleton_single() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let module = DiModule::new("eager", move |builder| {
        let counter = counter.clone();
        builder.bind_eager_singleton(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Service::new("eager"))
        })
    });
    let di = Di::new(|builder| {
        builder.import(&module)?;
        builder.import(&module)
    })
    .unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);
    drop(di);
}

#[test]
fn test_module_importing_another_module() {
    let inner = DiModule::new("inner", |builder| builder.bind_constant("inner", 1_i32));
    let outer = DiModule::new("outer", move |builder| {
        builder.import(&inner)?;
        builder.bind_constant("outer", 2_i32)
    });
    let di = Di::new(|builder| builder.import(&outer)).unwrap();
    let inner_value: Arc<i32> = di.instance(tag("inner")).unwrap();
    let outer_value: Arc<i32> = di.instance(tag("outer")).unwrap();
    assert_eq!((*inner_value, *outer_value), (1, 2));
}

#[test]
fn test_extend_shares_singleton_instances() {
    let base = Di::new(|builder| builder.bind_singleton(None, |_| Ok(Service::new("base"))))
        .unwrap();
    let extended = Di::new(|builder| {
        builder.extend(&base, false);
        builder.bind_constant("extra", 9_i32)
    })
    .unwrap();
    let from_base: Arc<Service> = base.instance(None).unwrap();
    let from_extended: Arc<Service> = extended.instance(None).unwrap();
    assert!(Arc::ptr_eq(&from_base, &from_extended));
    let extra: Arc<i32> = extended.instance(tag("extra")).unwrap();
    assert_eq!(*extra, 9);
    assert!(base.instance_or_none::<i32>(tag("extra")).unwrap().is_none());
}
