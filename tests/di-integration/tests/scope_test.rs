//! 作用域、上下文与上下文转换的集成测试

use di_core::bindings::{AnyValue, MultiItemScopeRegistry, Singleton};
use di_core::{ContextTranslator, Di, DiResult, DiScope, ScopeCloseable, ScopeRegistry, WeakContextScope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Session {
    id: u32,
}

#[derive(Debug)]
struct Request {
    session: Arc<Session>,
}

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

struct Connection {
    closed: AtomicBool,
}

impl Connection {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }
}

impl ScopeCloseable for Connection {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// 固定注册表的作用域，测试借此持有注册表句柄
struct FixedScope(Arc<MultiItemScopeRegistry>);

impl DiScope for FixedScope {
    fn get_registry(&self, _context: Option<&AnyValue>) -> DiResult<Arc<dyn ScopeRegistry>> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_weak_scope_caches_per_context_identity() {
    let scope = Arc::new(WeakContextScope::new());
    let di = Di::new(|builder| {
        builder.bind_scoped_singleton::<Session, _>(None, scope.clone(), |di| {
            let session = di.context::<Session>()?;
            Ok(Service::new(&format!("session-{}", session.id)))
        })
    })
    .unwrap();
    let s1 = Arc::new(Session { id: 1 });
    let s2 = Arc::new(Session { id: 2 });
    let a: Arc<Service> = di.direct().on(s1.clone()).instance(None).unwrap();
    let a2: Arc<Service> = di.direct().on(s1.clone()).instance(None).unwrap();
    let b: Arc<Service> = di.direct().on(s2.clone()).instance(None).unwrap();
    assert!(Arc::ptr_eq(&a, &a2));
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!((a.label.as_str(), b.label.as_str()), ("session-1", "session-2"));
}

#[test]
fn test_scoped_resolution_requires_matching_context() {
    let scope = Arc::new(WeakContextScope::new());
    let di = Di::new(|builder| {
        builder.bind_scoped_singleton::<Session, _>(None, scope.clone(), |_| {
            Ok(Service::new("scoped"))
        })
    })
    .unwrap();
    assert!(di.instance::<Service>(None).is_err());
}

#[test]
fn test_scoped_siblings_resolve_within_same_registry() {
    let scope = Arc::new(WeakContextScope::new());
    let di = Di::new(|builder| {
        builder.bind_scoped_singleton::<Session, _>(None, scope.clone(), |_| Ok(Repo))?;
        builder.bind_scoped_singleton::<Session, _>(None, scope.clone(), |di| {
            Ok(App {
                repo: di.instance(None)?,
            })
        })
    })
    .unwrap();
    let session = Arc::new(Session { id: 3 });
    let app: Arc<App> = di.direct().on(session.clone()).instance(None).unwrap();
    let repo: Arc<Repo> = di.direct().on(session.clone()).instance(None).unwrap();
    assert!(Arc::ptr_eq(&app.repo, &repo));
}

#[test]
fn test_context_translator_bridges_context_types() {
    let scope = Arc::new(WeakContextScope::new());
    let di = Di::new(|builder| {
        builder.bind_scoped_singleton::<Session, _>(None, scope.clone(), |_| {
            Ok(Service::new("conn"))
        })?;
        builder.register_context_translator(ContextTranslator::new(|request: &Request| {
            Ok(Some(request.session.clone()))
        }));
        Ok(())
    })
    .unwrap();
    let session = Arc::new(Session { id: 7 });
    let request = Arc::new(Request {
        session: session.clone(),
    });
    let via_session: Arc<Service> = di.direct().on(session.clone()).instance(None).unwrap();
    let via_request: Arc<Service> = di.direct().on(request).instance(None).unwrap();
    assert!(Arc::ptr_eq(&via_session, &via_request));
}

#[test]
fn test_registry_clear_closes_values_and_resets_cache() {
    let registry = Arc::new(MultiItemScopeRegistry::new());
    let scope = Arc::new(FixedScope(registry.clone()));
    let di = Di::new(|builder| {
        builder.bind(
            None,
            None,
            Singleton::scoped_closeable::<Session, Connection>(scope.clone(), |_| {
                Ok(Connection::new())
            }),
        )
    })
    .unwrap();
    let session = Arc::new(Session { id: 1 });
    let conn: Arc<Connection> = di.direct().on(session.clone()).instance(None).unwrap();
    assert!(!conn.closed.load(Ordering::SeqCst));
    assert_eq!(registry.len(), 1);

    registry.clear();
    assert!(conn.closed.load(Ordering::SeqCst));
    assert!(registry.is_empty());

    let fresh: Arc<Connection> = di.direct().on(session.clone()).instance(None).unwrap();
    assert!(!Arc::ptr_eq(&conn, &fresh));
}
