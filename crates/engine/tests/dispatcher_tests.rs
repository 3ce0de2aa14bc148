use std::sync::Arc;

use contour_common::types::{EventKind, LockOperation, MemberKind, OutOfModelValue, Value, ValueId};
use contour_engine::{
    remap_oid, AcceptAll, AccessorKind, EngineConfig, EventDispatcher, ExecutionModel,
    FieldInfo, LocalVariable, Location, MethodInfo, ModelError, ModelFilter, Notification,
    ObjectRef, RawValue, SyntheticAccessor, ThreadRef, TypeInfo,
};
use tracing::info;

fn main_thread() -> ThreadRef {
    ThreadRef::new(1, "main")
}

fn at(method: &str, line: u32) -> Location {
    Location::new("Main.java", line, "Main", method)
}

fn main_method() -> MethodInfo {
    MethodInfo::new("Main", "main").with_parameters(["java.lang.String[]"]).into_static()
}

fn dispatcher() -> EventDispatcher {
    let config = EngineConfig::default();
    let filter = Arc::new(config.exclusion_filter());
    EventDispatcher::with_config(Arc::new(ExecutionModel::new()), filter, config)
}

fn kinds(dispatcher: &EventDispatcher) -> Vec<&'static str> {
    dispatcher.model().read_lock().iter().map(|event| event.kind().name()).collect()
}

fn kinds_since(dispatcher: &EventDispatcher, skip: usize) -> Vec<&'static str> {
    kinds(dispatcher).into_iter().skip(skip).collect()
}

fn step(method: &str, line: u32, locals: Vec<LocalVariable>) -> Notification {
    Notification::Step { thread: main_thread(), location: at(method, line), locals }
}

fn enter(method: MethodInfo, receiver: Option<ObjectRef>, arguments: Vec<LocalVariable>) -> Notification {
    let location = at(&method.name, 1);
    Notification::MethodEntry { thread: main_thread(), location, method, receiver, arguments }
}

fn exit(method: MethodInfo, return_value: Option<RawValue>) -> Notification {
    let location = at(&method.name, 99);
    Notification::MethodExit { thread: main_thread(), location, method, return_value }
}

/// Starts the target and runs `main` up to its first line
fn start_main(dispatcher: &mut EventDispatcher) {
    let args = LocalVariable::new(
        "args",
        RawValue::Object(ObjectRef::array(0x10, "java.lang.String[]", 0)),
    );
    dispatcher
        .dispatch_all([
            Notification::VmStart { thread: main_thread() },
            enter(main_method(), None, vec![args]),
            step("main", 3, vec![]),
        ])
        .unwrap();
}

#[test]
fn test_call_stack_discipline() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    assert_eq!(
        kinds(&dispatcher),
        vec!["SYSTEM_START", "TYPE_LOAD", "METHOD_CALL", "VAR_ASSIGN", "METHOD_ENTERED", "LINE_STEP"]
    );

    let helper = MethodInfo::new("Main", "helper").with_parameters(["int"]).with_return_type("int");
    let x = |value: &str| vec![LocalVariable::new("x", RawValue::primitive(value))];
    dispatcher
        .dispatch_all([
            enter(
                helper.clone(),
                Some(ObjectRef::new(0x20, "Main")),
                vec![LocalVariable::new("n", RawValue::primitive(5))],
            ),
            exit(helper, Some(RawValue::primitive(10))),
            step("main", 4, x("10")),
            step("main", 5, x("10")),
            step("main", 6, vec![]),
            exit(main_method(), None),
            Notification::ThreadDeath { thread: main_thread() },
            Notification::VmDeath,
        ])
        .unwrap();

    assert_eq!(
        kinds_since(&dispatcher, 6),
        vec![
            "OBJECT_NEW",
            "METHOD_CALL",
            "VAR_ASSIGN",
            "METHOD_ENTERED",
            "METHOD_EXIT",
            "METHOD_RETURNED",
            "VAR_ASSIGN",
            "LINE_STEP",
            "LINE_STEP",
            "VAR_DELETE",
            "LINE_STEP",
            "METHOD_EXIT",
            "THREAD_END",
            "SYSTEM_END",
        ]
    );

    let guard = dispatcher.model().read_lock();
    let calls: Vec<_> = guard
        .iter()
        .filter_map(|event| match event.kind() {
            EventKind::MethodCall { caller, target } => Some((*caller, *target)),
            _ => None,
        })
        .collect();
    assert_eq!(calls[0].0, ValueId::SYSTEM_CALLER);
    assert_eq!(guard.value(calls[1].0), guard.value(calls[0].1));

    // The receiver parents the instance invocation
    let object = guard.instance_contour("Main", 0x20).unwrap();
    let Some(Value::MethodContourReference(helper)) = guard.value(calls[1].1).cloned() else {
        panic!("helper call target is not a method contour");
    };
    assert_eq!(guard.contour(helper).and_then(|c| c.parent()), Some(object.id()));

    // Excluded argument types stay out of the model
    let Some(Value::MethodContourReference(main)) = guard.value(calls[0].1).cloned() else {
        panic!("main call target is not a method contour");
    };
    let args = guard.contour(main).and_then(|c| c.member("args")).unwrap();
    assert_eq!(args.kind, MemberKind::Argument);
    assert!(matches!(guard.value(args.value), Some(Value::OutOfModel(OutOfModelValue::Resolved { .. }))));
    assert!(guard.contour(main).and_then(|c| c.member("x")).is_none());

    let returned = guard
        .iter()
        .find_map(|event| match event.kind() {
            EventKind::MethodReturned { value, .. } => *value,
            _ => None,
        })
        .unwrap();
    assert_eq!(guard.value(returned), Some(&Value::Primitive("10".to_string())));
}

#[test]
fn test_reassigned_argument_stays_an_argument() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    dispatcher
        .dispatch_all([
            step("main", 4, vec![LocalVariable::new("args", RawValue::Null)]),
            step("main", 5, vec![]),
        ])
        .unwrap();

    // Arguments out of view are not deleted
    assert_eq!(kinds_since(&dispatcher, 6), vec!["VAR_ASSIGN", "LINE_STEP", "LINE_STEP"]);

    let guard = dispatcher.model().read_lock();
    let EventKind::VarAssign { contour, .. } = guard.events()[6].kind() else {
        panic!("reassignment is not a VarAssign event");
    };
    let args = guard.contour(*contour).and_then(|c| c.member("args")).unwrap();
    assert_eq!(args.kind, MemberKind::Argument);
    assert_eq!(args.value, ValueId::NULL);
}

#[test]
fn test_synthetic_accessor_collapses_into_a_field_event() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    let before = dispatcher.model().len();

    let outer = ObjectRef::new(0x20, "Main");
    let accessor = MethodInfo::new("Main", "access$000")
        .with_parameters(["Main"])
        .with_return_type("int")
        .into_static()
        .with_accessor(SyntheticAccessor {
            owner_type: "Main".to_string(),
            field: "count".to_string(),
            kind: AccessorKind::Read,
            is_static: false,
        });

    dispatcher
        .dispatch_all([
            enter(
                accessor.clone(),
                None,
                vec![LocalVariable::new("this$0", RawValue::Object(outer.clone()))],
            ),
            Notification::FieldAccess {
                thread: main_thread(),
                location: at("access$000", 1),
                object: Some(outer),
                field: FieldInfo::new("Main", "count"),
                value: RawValue::primitive(3),
            },
            exit(accessor, Some(RawValue::primitive(3))),
        ])
        .unwrap();

    assert_eq!(kinds_since(&dispatcher, before), vec!["OBJECT_NEW", "FIELD_READ"]);
    assert_eq!(dispatcher.state().depth(1), 1);

    let guard = dispatcher.model().read_lock();
    let object = guard.instance_contour("Main", 0x20).unwrap();
    let count = object.member("count").unwrap();
    assert_eq!(guard.value(count.value), Some(&Value::Primitive("3".to_string())));
}

#[test]
fn test_out_of_model_calls_are_announced_once() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    let before = dispatcher.model().len();

    let add = MethodInfo::new("java.util.ArrayList", "add")
        .with_parameters(["java.lang.Object"])
        .with_return_type("boolean");
    let callback = MethodInfo::new("Main", "callback").into_static();
    dispatcher
        .dispatch_all([
            enter(add.clone(), Some(ObjectRef::new(0x30, "java.util.ArrayList")), vec![]),
            Notification::Step {
                thread: main_thread(),
                location: Location::new("ArrayList.java", 100, "java.util.ArrayList", "add"),
                locals: vec![],
            },
            enter(callback.clone(), None, vec![]),
            exit(callback, None),
            exit(add, Some(RawValue::primitive(true))),
            step("main", 5, vec![]),
        ])
        .unwrap();

    assert_eq!(
        kinds_since(&dispatcher, before),
        vec![
            "METHOD_CALL",
            "METHOD_CALL",
            "METHOD_ENTERED",
            "METHOD_EXIT",
            "METHOD_RETURNED",
            "LINE_STEP"
        ]
    );

    let guard = dispatcher.model().read_lock();
    let events = &guard.events()[before..];
    let EventKind::MethodCall { target: add_ref, .. } = events[0].kind() else {
        panic!("expected the out-of-model call first");
    };
    assert!(matches!(
        guard.value(*add_ref),
        Some(Value::OutOfModel(OutOfModelValue::MethodKeyReference(_)))
    ));
    let EventKind::MethodCall { caller, .. } = events[1].kind() else {
        panic!("expected the callback call second");
    };
    assert_eq!(caller, add_ref);
    let EventKind::MethodReturned { returner, .. } = events[4].kind() else {
        panic!("expected the out-of-model return");
    };
    assert_eq!(returner, add_ref);
}

#[test]
fn test_contradicting_exits_are_ignored() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    let appended = dispatcher.dispatch(exit(MethodInfo::new("Main", "run"), None)).unwrap();
    assert_eq!(appended, 0);
    assert!(dispatcher.model().is_empty());

    start_main(&mut dispatcher);
    let before = dispatcher.model().len();
    let appended = dispatcher.dispatch(exit(MethodInfo::new("Main", "other"), None)).unwrap();
    assert_eq!(appended, 0);
    assert_eq!(dispatcher.model().len(), before);
    assert_eq!(dispatcher.state().depth(1), 1);

    // The stack is intact and main still exits normally
    dispatcher.dispatch(exit(main_method(), None)).unwrap();
    assert_eq!(kinds_since(&dispatcher, before), vec!["METHOD_EXIT"]);
}

#[test]
fn test_steps_outside_the_model_are_filtered() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    let before = dispatcher.model().len();

    assert_eq!(dispatcher.dispatch(step("main", 0, vec![])).unwrap(), 0);
    let library = Notification::Step {
        thread: main_thread(),
        location: Location::new("Main.java", 7, "java.lang.Thread", "run"),
        locals: vec![],
    };
    assert_eq!(dispatcher.dispatch(library).unwrap(), 0);
    assert_eq!(dispatcher.model().len(), before);
}

#[test]
fn test_exception_is_caught_at_the_next_step() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    let before = dispatcher.model().len();

    let risky = MethodInfo::new("Main", "risky").into_static();
    let boom = ObjectRef::new(0x40, "com.acme.Boom");
    dispatcher
        .dispatch_all([
            enter(risky.clone(), None, vec![]),
            step("risky", 10, vec![]),
            Notification::Exception {
                thread: main_thread(),
                location: at("risky", 11),
                exception: boom.clone(),
                catch_location: Some(at("main", 5)),
            },
            exit(risky, None),
            step("main", 5, vec![LocalVariable::new("e", RawValue::Object(boom))]),
        ])
        .unwrap();

    assert_eq!(
        kinds_since(&dispatcher, before),
        vec![
            "METHOD_CALL",
            "METHOD_ENTERED",
            "LINE_STEP",
            "TYPE_LOAD",
            "OBJECT_NEW",
            "EXCEPTION_THROW",
            "METHOD_EXIT",
            "METHOD_RETURNED",
            "EXCEPTION_CATCH",
            "VAR_ASSIGN",
            "LINE_STEP",
        ]
    );

    let guard = dispatcher.model().read_lock();
    let boom = guard.instance_contour("com.acme.Boom", 0x40).unwrap().id();
    let throw = guard.iter().find_map(|event| match event.kind() {
        EventKind::ExceptionThrow { exception, frames_popped, .. } => Some((*exception, *frames_popped)),
        _ => None,
    });
    let (exception, frames_popped) = throw.unwrap();
    assert!(frames_popped);
    assert_eq!(guard.value(exception), Some(&Value::ContourReference(boom)));

    let catch = guard.iter().find_map(|event| match event.kind() {
        EventKind::ExceptionCatch { exception, variable, .. } => Some((*exception, variable.clone())),
        _ => None,
    });
    assert_eq!(catch, Some((exception, Some("e".to_string()))));
}

#[test]
fn test_thread_death_closes_open_frames() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    let helper = MethodInfo::new("Main", "helper").into_static();
    dispatcher.dispatch(enter(helper, None, vec![])).unwrap();
    let before = dispatcher.model().len();

    dispatcher.dispatch(Notification::ThreadDeath { thread: main_thread() }).unwrap();
    assert_eq!(kinds_since(&dispatcher, before), vec!["METHOD_EXIT", "METHOD_EXIT", "THREAD_END"]);
    assert!(dispatcher.state().thread(1).is_none());

    let guard = dispatcher.model().read_lock();
    let exited: Vec<_> = guard.events()[before..]
        .iter()
        .filter_map(|event| match event.kind() {
            EventKind::MethodExit { contour, .. } => guard.contour(*contour),
            _ => None,
        })
        .map(|contour| contour.method().map(|key| key.method_name().to_string()))
        .collect();
    assert_eq!(exited, vec![Some("helper".to_string()), Some("main".to_string())]);
}

#[test]
fn test_system_exit_is_emitted_once() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    dispatcher
        .dispatch_all([
            Notification::VmStart { thread: main_thread() },
            Notification::VmDeath,
            Notification::VmDisconnect,
            Notification::Unrecognized { name: "breakpoint".to_string() },
        ])
        .unwrap();
    assert_eq!(kinds(&dispatcher), vec!["SYSTEM_START", "SYSTEM_END"]);
}

#[test]
fn test_collected_objects_are_destroyed_and_ids_remapped() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    let before = dispatcher.model().len();

    let object = ObjectRef::new(0x50, "Main");
    let write = |value: i32| Notification::FieldModify {
        thread: main_thread(),
        location: at("main", 8),
        object: Some(object.clone()),
        field: FieldInfo::new("Main", "items"),
        value: RawValue::primitive(value),
    };
    dispatcher
        .dispatch_all([
            write(1),
            Notification::ObjectCollected { object: object.clone() },
            Notification::ObjectCollected { object: ObjectRef::new(0x99, "Main") },
            write(2),
        ])
        .unwrap();

    assert_eq!(
        kinds_since(&dispatcher, before),
        vec!["OBJECT_NEW", "FIELD_WRITE", "DESTROY", "OBJECT_NEW", "FIELD_WRITE"]
    );

    let guard = dispatcher.model().read_lock();
    let destroy = &guard.events()[before + 2];
    assert_eq!(destroy.thread(), ValueId::SYSTEM_THREAD);
    let collected = guard.instance_contour("Main", 0x50).unwrap();
    assert_eq!(collected.collected_at(), Some(destroy.id()));

    let reborn = guard.instance_contour("Main", remap_oid(0x50)).unwrap();
    assert_eq!(reborn.collected_at(), None);
    let written = guard.store().values.lookup(&Value::Primitive("2".to_string()));
    assert_eq!(reborn.member("items").map(|member| member.value), written);
}

#[test]
fn test_array_store_writes_a_cell() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    let before = dispatcher.model().len();

    dispatcher
        .dispatch(Notification::ArrayStore {
            thread: main_thread(),
            location: at("main", 9),
            array: ObjectRef::array(0x60, "int[]", 3),
            index: 1,
            value: RawValue::primitive(9),
        })
        .unwrap();
    assert_eq!(kinds_since(&dispatcher, before), vec!["TYPE_LOAD", "OBJECT_NEW", "FIELD_WRITE"]);

    let guard = dispatcher.model().read_lock();
    let array = guard.instance_contour("int[]", 0x60).unwrap();
    assert_eq!(array.array_len(), Some(3));
    assert_eq!(array.member("[1]").map(|member| member.kind), Some(MemberKind::ArrayCell));
}

#[test]
fn test_class_prepare_registers_supertypes() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    dispatcher
        .dispatch_all([
            Notification::ClassPrepare {
                thread: main_thread(),
                type_info: TypeInfo {
                    name: "com.acme.Child".to_string(),
                    supertype: Some("com.acme.Base".to_string()),
                    is_interface: false,
                },
            },
            Notification::ClassPrepare {
                thread: main_thread(),
                type_info: TypeInfo {
                    name: "java.util.HashMap".to_string(),
                    supertype: Some("java.util.AbstractMap".to_string()),
                    is_interface: false,
                },
            },
        ])
        .unwrap();

    assert_eq!(kinds(&dispatcher), vec!["TYPE_LOAD", "TYPE_LOAD"]);
    let guard = dispatcher.model().read_lock();
    let base = guard.static_contour("com.acme.Base").unwrap();
    let child = guard.static_contour("com.acme.Child").unwrap();
    assert_eq!(child.parent(), Some(base.id()));
    assert!(guard.static_contour("java.util.HashMap").is_none());
    assert_eq!(dispatcher.model().runtime_types().type_count(), 2);
}

#[test]
fn test_monitor_operations_are_tracked() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut dispatcher = dispatcher();
    start_main(&mut dispatcher);
    let lock = ObjectRef::new(0x70, "Main");
    let monitor = |operation| Notification::Monitor {
        thread: main_thread(),
        location: at("main", 12),
        lock: lock.clone(),
        operation,
    };

    dispatcher.dispatch(monitor(LockOperation::Acquire)).unwrap();
    assert_eq!(dispatcher.state().thread(1).map(|state| state.locks().len()), Some(1));
    dispatcher.dispatch(monitor(LockOperation::Release)).unwrap();
    assert_eq!(dispatcher.state().thread(1).map(|state| state.locks().len()), Some(0));

    let locks = dispatcher
        .model()
        .read_lock()
        .iter()
        .filter(|event| matches!(event.kind(), EventKind::Lock { .. }))
        .count();
    assert_eq!(locks, 2);
}

#[derive(Debug)]
struct MainThreadOnly;

impl ModelFilter for MainThreadOnly {
    fn accepts_type(&self, _type_name: &str) -> bool {
        true
    }

    fn accepts_thread(&self, thread: &ThreadRef) -> bool {
        thread.name == "main"
    }
}

#[test]
fn test_filtered_threads_produce_nothing() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let mut dispatcher = EventDispatcher::new(model.clone(), Arc::new(MainThreadOnly));
    let appended = dispatcher
        .dispatch(Notification::VmStart { thread: ThreadRef::new(2, "Reference Handler") })
        .unwrap();
    assert_eq!(appended, 0);
    assert!(model.is_empty());

    assert_eq!(dispatcher.dispatch(Notification::VmStart { thread: main_thread() }).unwrap(), 1);
}

#[test]
fn test_closed_model_rejects_notifications() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let mut dispatcher = EventDispatcher::new(model.clone(), Arc::new(AcceptAll));
    model.done();
    assert_eq!(dispatcher.dispatch(Notification::VmDeath), Err(ModelError::Closed));
}
