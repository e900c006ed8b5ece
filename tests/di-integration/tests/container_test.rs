//! 解析引擎行为的集成测试：循环检测、未命中诊断、回退钩子

use di_core::bindings::{AnyValue, BindingFn, DiBinding, Provider, SubtypeDispatch};
use di_core::{Di, DiError, DiKey, DirectDi, ExternalSource, TypeToken};
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
struct Ping {
    #[allow(dead_code)]
    pong: Arc<Pong>,
}

#[derive(Debug)]
struct Pong {
    #[allow(dead_code)]
    ping: Arc<Ping>,
}

struct Fallback;

impl ExternalSource for Fallback {
    fn get_factory(&self, _di: &DirectDi, key: &DiKey) -> Option<BindingFn> {
        (key.result_type == TypeToken::of::<u32>())
            .then(|| Box::new(|_arg: AnyValue| Ok(Arc::new(7_u32) as AnyValue)) as BindingFn)
    }
}

#[test]
fn test_dependency_loop_detected() {
    let di = Di::new(|builder| {
        builder.bind_provider(None, |di| {
            Ok(Ping {
                pong: di.instance(None)?,
            })
        })?;
        builder.bind_provider(None, |di| {
            Ok(Pong {
                ping: di.instance(None)?,
            })
        })
    })
    .unwrap();
    let err = di.instance::<Ping>(None).unwrap_err();
    assert!(matches!(err, DiError::DependencyLoop { .. }));
}

#[test]
fn test_loop_error_not_absorbed_by_or_none() {
    let di = Di::new(|builder| {
        builder.bind_provider(None, |di| {
            Ok(Ping {
                pong: di.instance(None)?,
            })
        })?;
        builder.bind_provider(None, |di| {
            Ok(Pong {
                ping: di.instance(None)?,
            })
        })
    })
    .unwrap();
    let result = di.instance_or_none::<Ping>(None);
    assert!(matches!(result, Err(DiError::DependencyLoop { .. })));
}

#[test]
fn test_not_found_reports_related_bindings() {
    let di = Di::new(|builder| builder.bind_provider(None, |_| Ok(Service::new("p")))).unwrap();
    let err = di.instance::<u64>(None).unwrap_err();
    assert!(matches!(err, DiError::NotFound { .. }));
    assert!(err.to_string().contains("未找到绑定"));
}

#[test]
fn test_or_none_variants_swallow_only_not_found() {
    let di = Di::new(|builder| builder.bind_provider(None, |_| Ok(Service::new("p")))).unwrap();
    assert!(di.instance_or_none::<Service>(None).unwrap().is_some());
    assert!(di.instance_or_none::<u64>(None).unwrap().is_none());
    let direct = di.direct();
    assert!(direct.provider_or_none::<u64>(None).unwrap().is_none());
    assert!(direct
        .factory_or_none::<String, u64>(None)
        .unwrap()
        .is_none());
}

#[test]
fn test_has_factory_is_pure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let di = Di::new(move |builder| {
        builder.bind_singleton(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Service::new("s"))
        })
    })
    .unwrap();
    assert!(di.has_provider::<Service>(None));
    assert!(!di.has_provider::<u64>(None));
    assert!(di.direct().has_factory::<(), Service>(None));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_external_source_serves_unbound_key() {
    let di = Di::new(|builder| {
        builder.external_source(Fallback);
        Ok(())
    })
    .unwrap();
    let value: Arc<u32> = di.instance(None).unwrap();
    assert_eq!(*value, 7);
    assert!(matches!(
        di.instance::<u64>(None),
        Err(DiError::NotFound { .. })
    ));
}

#[test]
fn test_registered_binding_wins_over_external_source() {
    let di = Di::new(|builder| {
        builder.external_source(Fallback);
        builder.bind_instance(None, 13_u32)
    })
    .unwrap();
    let value: Arc<u32> = di.instance(None).unwrap();
    assert_eq!(*value, 13);
}

#[test]
fn test_open_result_binding_serves_requested_type() {
    let di = Di::new(|builder| {
        builder.bind(
            None,
            None,
            SubtypeDispatch::new(TypeToken::Any, |requested| {
                if *requested == TypeToken::of::<Service>() {
                    Ok(Arc::new(Provider::new(|_| Ok(Service::new("dispatched"))))
                        as Arc<dyn DiBinding>)
                } else {
                    Err(DiError::illegal_state("不支持的结果类型"))
                }
            }),
        )
    })
    .unwrap();
    let service: Arc<Service> = di.instance(None).unwrap();
    assert_eq!(service.label, "dispatched");
}

#[test]
fn test_exact_binding_preferred_over_open_binding() {
    let di = Di::new(|builder| {
        builder.bind_provider(None, |_| Ok(Service::new("exact")))?;
        builder.bind(
            None,
            None,
            SubtypeDispatch::new(TypeToken::Any, |_| {
                Ok(Arc::new(Provider::new(|_| Ok(Service::new("dispatched"))))
                    as Arc<dyn DiBinding>)
            }),
        )
    })
    .unwrap();
    let service: Arc<Service> = di.instance(None).unwrap();
    assert_eq!(service.label, "exact");
    let all = di.direct().all_instances::<Service>(None).unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_parametrized_descriptor_lookup_with_wildcard() {
    let holder_of = |arg: TypeToken| TypeToken::parametrized("Holder", vec![arg]);
    let open = holder_of(TypeToken::Wildcard);
    let di = Di::new(|builder| {
        builder.bind(
            None,
            None,
            SubtypeDispatch::new(open, |requested| {
                let requested = requested.clone();
                Ok(Arc::new(Provider::with_token::<String>(
                    requested.clone(),
                    move |_| Ok(format!("{requested}")),
                )) as Arc<dyn DiBinding>)
            }),
        )
    })
    .unwrap();
    let concrete = holder_of(TypeToken::of::<i32>());
    let value: Arc<String> = di.direct().instance_of(concrete, None).unwrap();
    assert_eq!(value.as_str(), "Holder<i32>");
}

#[test]
fn test_on_ready_callback_runs_before_first_retrieval() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let di = Di::new(move |builder| {
        builder.bind_constant("answer", 42_i32)?;
        builder.on_ready(move |di| {
            let answer: Arc<i32> = di.instance(di_core::tag("answer"))?;
            counter.fetch_add(*answer as usize, Ordering::SeqCst);
            Ok(())
        });
        Ok(())
    })
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 42);
    drop(di);
}

#[test]
fn test_delayed_callbacks_postpone_eager_singletons() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let (di, callbacks) = Di::with_delayed_callbacks(false, move |builder| {
        builder.bind_eager_singleton(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Service::new("eager"))
        })
    })
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    callbacks.run().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let _service: Arc<Service> = di.instance(None).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
