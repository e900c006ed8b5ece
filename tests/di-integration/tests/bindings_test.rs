//! 标准绑定行为的集成测试

use di_core::bindings::{Provider, Singleton};
use di_core::{tag, Di};
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

#[derive(Debug)]
struct Repo;

#[derive(Debug)]
struct App {
    repo: Arc<Repo>,
}

#[test]
fn test_provider_returns_new_instance_each_time() {
    let di = Di::new(|builder| builder.bind_provider(None, |_| Ok(Service::new("p")))).unwrap();
    let a: Arc<Service> = di.instance(None).unwrap();
    let b: Arc<Service> = di.instance(None).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.label, "p");
}

#[test]
fn test_singleton_created_once_and_lazily() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let di = Di::new(move |builder| {
        builder.bind_singleton(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Service::new("s"))
        })
    })
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let a: Arc<Service> = di.instance(None).unwrap();
    let b: Arc<Service> = di.instance(None).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_factory_passes_argument() {
    let di =
        Di::new(|builder| builder.bind_factory(None, |_, name: &String| Ok(Service::new(name))))
            .unwrap();
    let service: Arc<Service> = di.instance_with(None, "arg".to_owned()).unwrap();
    assert_eq!(service.label, "arg");
}

#[test]
fn test_factory_function_invocable_repeatedly() {
    let di =
        Di::new(|builder| builder.bind_factory(None, |_, name: &String| Ok(Service::new(name))))
            .unwrap();
    let factory = di.factory::<String, Service>(None).unwrap();
    let a = factory("a".to_owned()).unwrap();
    let b = factory("b".to_owned()).unwrap();
    assert_eq!((a.label.as_str(), b.label.as_str()), ("a", "b"));
}

#[test]
fn test_multiton_caches_per_argument_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let di = Di::new(move |builder| {
        builder.bind_multiton(None, move |_, name: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Service::new(name))
        })
    })
    .unwrap();
    let a: Arc<Service> = di.instance_with(None, "a".to_owned()).unwrap();
    let a2: Arc<Service> = di.instance_with(None, "a".to_owned()).unwrap();
    let b: Arc<Service> = di.instance_with(None, "b".to_owned()).unwrap();
    assert!(Arc::ptr_eq(&a, &a2));
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_constant_retrieved_by_tag() {
    let di = Di::new(|builder| builder.bind_constant("answer", 42_i32)).unwrap();
    let answer: Arc<i32> = di.instance(tag("answer")).unwrap();
    assert_eq!(*answer, 42);
    assert!(di.instance_or_none::<i32>(None).unwrap().is_none());
}

#[test]
fn test_tags_distinguish_bindings_of_same_type() {
    let di = Di::new(|builder| {
        builder.bind_constant("a", "alpha".to_owned())?;
        builder.bind_constant("b", "beta".to_owned())?;
        builder.bind_constant(7_i64, "seven".to_owned())
    })
    .unwrap();
    let a: Arc<String> = di.instance(tag("a")).unwrap();
    let b: Arc<String> = di.instance(tag("b")).unwrap();
    let seven: Arc<String> = di.instance(tag(7_i64)).unwrap();
    assert_eq!(
        (a.as_str(), b.as_str(), seven.as_str()),
        ("alpha", "beta", "seven")
    );
}

#[test]
fn test_instance_binding_returns_same_value() {
    let di = Di::new(|builder| builder.bind_instance(None, Service::new("i"))).unwrap();
    let a: Arc<Service> = di.instance(None).unwrap();
    let b: Arc<Service> = di.instance(None).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_eager_singleton_created_at_build_time() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let di = Di::new(move |builder| {
        builder.bind_eager_singleton(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Service::new("eager"))
        })
    })
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let a: Arc<Service> = di.instance(None).unwrap();
    let b: Arc<Service> = di.instance(None).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_provider_function_goes_through_binding_policy() {
    let di = Di::new(|builder| builder.bind_singleton(None, |_| Ok(Service::new("s")))).unwrap();
    let provider = di.provider::<Service>(None).unwrap();
    let a = provider().unwrap();
    let b = provider().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_lazy_instance_resolves_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let di = Di::new(move |builder| {
        builder.bind_provider(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Service::new("lazy"))
        })
    })
    .unwrap();
    let lazy = di.lazy_instance::<Service>(None);
    assert!(!lazy.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let a = lazy.get().unwrap();
    let b = lazy.get().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_set_binding_aggregates_elements() {
    let di = Di::new(|builder| {
        builder.bind_set::<(), Service>(None)?;
        builder.in_set::<(), Service>(None, Arc::new(Provider::new(|_| Ok(Service::new("a")))))?;
        builder.in_set::<(), Service>(None, Arc::new(Singleton::new(|_| Ok(Service::new("b")))))
    })
    .unwrap();
    let set: Arc<Vec<Arc<Service>>> = di.instance(None).unwrap();
    let again: Arc<Vec<Arc<Service>>> = di.instance(None).unwrap();
    assert_eq!(set.len(), 2);

    // 单例元素跨两次聚合保持同一实例, 提供者元素每次都是新值
    let find = |items: &Arc<Vec<Arc<Service>>>, label: &str| {
        items.iter().find(|s| s.label == label).unwrap().clone()
    };
    assert!(Arc::ptr_eq(&find(&set, "b"), &find(&again, "b")));
    assert!(!Arc::ptr_eq(&find(&set, "a"), &find(&again, "a")));
}

#[test]
fn test_set_binding_rejects_foreign_element_type() {
    let result = Di::new(|builder| {
        builder.bind_set::<(), Service>(None)?;
        builder.in_set::<(), Service>(None, Arc::new(Provider::new(|_| Ok(42_i32))))
    });
    assert!(result.is_err());
}

#[test]
fn test_nested_resolution_inside_creator() {
    let di = Di::new(|builder| {
        builder.bind_singleton(None, |_| Ok(Repo))?;
        builder.bind_singleton(None, |di| {
            Ok(App {
                repo: di.instance(None)?,
            })
        })
    })
    .unwrap();
    let app: Arc<App> = di.instance(None).unwrap();
    let repo: Arc<Repo> = di.instance(None).unwrap();
    assert!(Arc::ptr_eq(&app.repo, &repo));
}
