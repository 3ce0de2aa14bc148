use std::{io::Write, sync::Arc};

use contour_common::types::{ContourKind, Event, EventKind, TypeNode, Value, ValueId};
use contour_engine::{
    ExecutionModel, ImportError, StaticResolver, TraceImporter, TraceListener, TypeRegistry,
};
use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Default)]
struct BatchRecorder {
    batches: Mutex<Vec<usize>>,
}

impl TraceListener for BatchRecorder {
    fn events_inserted(&self, events: &[Event]) {
        self.batches.lock().push(events.len());
    }
}

fn log(records: &[&str]) -> String {
    let mut text = String::from("<?xml version=\"1.0\"?>\n<trace>\n");
    for record in records {
        text.push_str("  <event>");
        text.push_str(record);
        text.push_str("</event>\n");
    }
    text.push_str("</trace>\n");
    text
}

fn kinds(model: &ExecutionModel) -> Vec<&'static str> {
    model.read_lock().iter().map(|event| event.kind().name()).collect()
}

#[test]
fn test_colliding_object_ids_are_remapped() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let text = log(&[
        "<kind>OBJECT_NEW</kind><thread>1</thread><type>com.acme.Node</type><object>a</object>",
        "<kind>OBJECT_NEW</kind><thread>1</thread><type>com.acme.Node</type><object>0xa</object>",
    ]);
    let summary = TraceImporter::new(model.clone()).import_str(&text).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.events, 3);

    assert_eq!(kinds(&model), vec!["TYPE_LOAD", "OBJECT_NEW", "OBJECT_NEW"]);
    let guard = model.read_lock();
    let first = guard.instance_contour("com.acme.Node", 10).unwrap();
    let second = guard.instance_contour("com.acme.Node", 80).unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(first.parent(), second.parent());
    assert_eq!(guard.static_contour("com.acme.Node").map(|c| c.id()), first.parent());
}

#[test]
fn test_events_are_appended_in_batches() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let recorder = Arc::new(BatchRecorder::default());
    model.add_listener(recorder.clone());

    let step = "<kind>LINE_STEP</kind><thread>1</thread><file>Main.java</file><line>3</line>";
    let text = log(&[step; 150]);
    let summary = TraceImporter::new(model.clone()).import_str(&text).unwrap();

    assert_eq!(summary.events, 150);
    assert_eq!(summary.batches, 2);
    assert_eq!(*recorder.batches.lock(), vec![100, 50]);

    let guard = model.read_lock();
    let line = guard.line_value("Main.java", 3).unwrap();
    assert!(guard.iter().all(|event| event.line() == line));
}

#[test]
fn test_custom_batch_size() {
    contour_common::logging::ensure_test_logging(None);

    let model = Arc::new(ExecutionModel::new());
    let recorder = Arc::new(BatchRecorder::default());
    model.add_listener(recorder.clone());

    let text = log(&["<kind>LINE_STEP</kind>"; 5]);
    TraceImporter::new(model.clone()).with_batch_size(2).import_str(&text).unwrap();
    assert_eq!(*recorder.batches.lock(), vec![2, 2, 1]);
}

#[test]
fn test_type_load_record_cascades_supertypes() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let text = log(&[
        "<kind>TYPE_LOAD</kind><thread>1</thread><type>com.acme.Child</type><supertype>com.acme.Base</supertype>",
        "<kind>METHOD_CALL</kind><thread>1</thread><signature>com.acme.Child#run():void</signature>",
    ]);
    TraceImporter::new(model.clone()).import_str(&text).unwrap();

    assert_eq!(kinds(&model), vec!["TYPE_LOAD", "TYPE_LOAD", "METHOD_CALL"]);
    let guard = model.read_lock();
    let base = guard.static_contour("com.acme.Base").unwrap();
    let child = guard.static_contour("com.acme.Child").unwrap();
    assert_eq!(child.parent(), Some(base.id()));

    let loaded: Vec<_> = guard
        .iter()
        .filter_map(|event| match event.kind() {
            EventKind::TypeLoad { contour } => Some(*contour),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, vec![base.id(), child.id()]);
}

#[test]
fn test_first_call_on_a_thread_comes_from_the_system() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let text = log(&[
        "<kind>SYSTEM_START</kind>",
        "<kind>METHOD_CALL</kind><thread>1</thread><threadName>main</threadName><signature>Main#main(java.lang.String[])</signature>",
        "<kind>METHOD_ENTERED</kind><thread>1</thread>",
        "<kind>VAR_ASSIGN</kind><thread>1</thread><variable>x</variable><value>42</value>",
        "<kind>METHOD_CALL</kind><thread>1</thread><signature>Main#helper(int):int</signature><target>Main@1f</target>",
        "<kind>METHOD_EXIT</kind><thread>1</thread><value>7</value>",
        "<kind>VAR_DELETE</kind><thread>1</thread><variable>x</variable>",
        "<kind>METHOD_EXIT</kind><thread>1</thread>",
        "<kind>THREAD_END</kind><thread>1</thread>",
        "<kind>SYSTEM_END</kind>",
    ]);
    TraceImporter::new(model.clone()).import_str(&text).unwrap();

    let guard = model.read_lock();
    let calls: Vec<_> = guard
        .iter()
        .filter_map(|event| match event.kind() {
            EventKind::MethodCall { caller, target } => Some((*caller, *target)),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, ValueId::SYSTEM_CALLER);

    let Some(Value::MethodContourReference(main)) = guard.value(calls[0].1).cloned() else {
        panic!("target of the first call is not a method contour");
    };
    assert_eq!(guard.value(calls[1].0), Some(&Value::MethodContourReference(main)));

    // Instance call: inferred object parents the helper invocation
    let Some(Value::MethodContourReference(helper)) = guard.value(calls[1].1).cloned() else {
        panic!("target of the second call is not a method contour");
    };
    let object = guard.instance_contour("Main", 0x1f).unwrap();
    assert_eq!(guard.contour(helper).and_then(|c| c.parent()), Some(object.id()));
    assert_eq!(object.kind(), ContourKind::Object);

    let main_contour = guard.contour(main).unwrap();
    assert!(main_contour.member("x").is_none());
    assert_eq!(guard.thread_value(1).and_then(|id| guard.value(id)).cloned(), Some(Value::Thread {
        id: 1,
        name: "main".to_string()
    }));
    assert_eq!(guard.iter().last().map(|event| event.kind().name()), Some("SYSTEM_END"));
}

#[test]
fn test_unsupported_and_unknown_kinds_are_skipped() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let text = log(&[
        "<kind>LOCK</kind><thread>1</thread>",
        "<kind>EXCEPTION_THROW</kind><thread>1</thread>",
        "<kind>TELEPORT</kind>",
        "<thread>1</thread>",
        "<kind>LINE_STEP</kind>",
    ]);
    let summary = TraceImporter::new(model.clone()).import_str(&text).unwrap();

    assert_eq!(summary.records, 5);
    assert_eq!(summary.skipped, 4);
    assert_eq!(kinds(&model), vec!["LINE_STEP"]);
}

#[test]
fn test_call_cascades_resolved_supertypes() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let source: Arc<dyn StaticResolver> = Arc::new(TypeRegistry::with_types("source", [
        TypeNode::class("com.acme.Child").with_supertype("com.acme.Base"),
        TypeNode::class("com.acme.Base"),
    ]));
    let model = Arc::new(ExecutionModel::with_resolvers(vec![source]));
    let text = log(&[
        "<kind>METHOD_CALL</kind><thread>1</thread><signature>com.acme.Child#run():void</signature>",
    ]);
    TraceImporter::new(model.clone()).import_str(&text).unwrap();

    assert_eq!(kinds(&model), vec!["TYPE_LOAD", "TYPE_LOAD", "METHOD_CALL"]);
    let guard = model.read_lock();
    let base = guard.static_contour("com.acme.Base").unwrap();
    let child = guard.static_contour("com.acme.Child").unwrap();
    assert_eq!(child.parent(), Some(base.id()));
    assert!(matches!(guard.events()[0].kind(), EventKind::TypeLoad { contour } if *contour == base.id()));
    assert!(matches!(guard.events()[1].kind(), EventKind::TypeLoad { contour } if *contour == child.id()));
}

#[test]
fn test_fault_leaves_no_contour_without_its_event() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let text = log(&[
        "<kind>TYPE_LOAD</kind><thread>1</thread><type>Foo</type>",
        "<kind>OBJECT_NEW</kind><thread>1</thread><type>Bar</type><object>1</object><size>many</size>",
    ]);
    let err = TraceImporter::new(model.clone()).import_str(&text).unwrap_err();
    assert!(matches!(err, ImportError::Malformed { record: 2, .. }), "{err}");

    // The loaded type keeps its event, the rejected record created nothing
    assert_eq!(kinds(&model), vec!["TYPE_LOAD"]);
    {
        let guard = model.read_lock();
        let foo = guard.static_contour("Foo").unwrap();
        assert!(matches!(guard.events()[0].kind(), EventKind::TypeLoad { contour } if *contour == foo.id()));
        assert!(guard.static_contour("Bar").is_none());
        assert!(guard.instance_contour("Bar", 1).is_none());
    }

    let text = log(&["<kind>METHOD_CALL</kind><thread>1</thread><signature>Foo#run():void</signature>"]);
    TraceImporter::new(model.clone()).import_str(&text).unwrap();
    assert_eq!(kinds(&model), vec!["TYPE_LOAD", "METHOD_CALL"]);

    let guard = model.read_lock();
    let loaded: Vec<_> = guard
        .iter()
        .filter_map(|event| match event.kind() {
            EventKind::TypeLoad { contour } => Some(*contour),
            _ => None,
        })
        .collect();
    for contour in guard.store().contours.iter().filter(|c| c.kind() == ContourKind::Static) {
        assert!(loaded.contains(&contour.id()), "no TypeLoad for {}", contour.type_name());
    }
}

#[test]
fn test_malformed_record_keeps_replayed_records() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let text = log(&[
        "<kind>LINE_STEP</kind>",
        "<kind>LINE_STEP</kind>",
        "<kind>LINE_STEP</kind>",
        "<kind>OBJECT_NEW</kind><type>Foo</type><object>not-hex</object>",
        "<kind>LINE_STEP</kind>",
    ]);
    let err = TraceImporter::new(model.clone()).with_batch_size(2).import_str(&text).unwrap_err();

    assert!(matches!(err, ImportError::InvalidOid { record: 4, ref text } if text == "not-hex"), "{err}");
    assert_eq!(model.len(), 3);
    assert!(model.with_store(|store| store.contours.lookup_static_contour("Foo").is_none()));
}

#[test]
fn test_exit_on_an_empty_stack_aborts() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let text = log(&["<kind>LINE_STEP</kind>", "<kind>METHOD_EXIT</kind><thread>7</thread>"]);
    let err = TraceImporter::new(model.clone()).import_str(&text).unwrap_err();

    assert_eq!(err.to_string(), "record 2: METHOD_EXIT on thread 7 with an empty call stack");
    assert_eq!(kinds(&model), vec!["LINE_STEP"]);
    assert!(model.read_lock().thread_value(7).is_none());
}

#[test]
fn test_invalid_signature_is_rejected() {
    contour_common::logging::ensure_test_logging(None);

    let model = Arc::new(ExecutionModel::new());
    let text = log(&["<kind>METHOD_CALL</kind><signature>run()</signature>"]);
    let err = TraceImporter::new(model).import_str(&text).unwrap_err();
    assert!(matches!(err, ImportError::Signature { record: 1, .. }), "{err}");
}

#[test]
fn test_field_values_and_array_cells() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let model = Arc::new(ExecutionModel::new());
    let text = log(&[
        "<kind>OBJECT_NEW</kind><type>int[]</type><object>2</object><size>3</size>",
        "<kind>OBJECT_NEW</kind><type>Box</type><object>1</object>",
        "<kind>FIELD_WRITE</kind><object>Box@1</object><field>items</field><value>int[]@2</value>",
        "<kind>FIELD_WRITE</kind><object>2</object><type>int[]</type><field>[0]</field><value>5</value>",
        "<kind>FIELD_WRITE</kind><type>Config</type><field>name</field><value>java.lang.String@9</value>",
        "<kind>FIELD_READ</kind><object>Box@1</object><field>label</field><value>null</value>",
        "<kind>FIELD_READ</kind><type>Config</type><field>size</field>",
    ]);
    TraceImporter::new(model.clone()).import_str(&text).unwrap();

    let guard = model.read_lock();
    let array = guard.instance_contour("int[]", 2).unwrap();
    assert_eq!(array.array_len(), Some(3));
    let cell = array.member("[0]").unwrap();
    assert_eq!(guard.value(cell.value), Some(&Value::Primitive("5".to_string())));

    let boxed = guard.instance_contour("Box", 1).unwrap();
    let items = boxed.member("items").unwrap();
    assert_eq!(guard.value(items.value), Some(&Value::ContourReference(array.id())));
    assert_eq!(boxed.member("label").map(|member| member.value), Some(ValueId::NULL));

    let config = guard.static_contour("Config").unwrap();
    assert_eq!(config.member("size").map(|member| member.value), Some(ValueId::UNINITIALIZED));
    let name = config.member("name").unwrap();
    assert!(matches!(guard.value(name.value), Some(Value::OutOfModel(_))));
}

#[test]
fn test_import_file() {
    contour_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(log(&["<kind>SYSTEM_START</kind>", "<kind>SYSTEM_END</kind>"]).as_bytes())
        .unwrap();

    let model = Arc::new(ExecutionModel::new());
    let summary = TraceImporter::new(model.clone()).import_file(file.path()).unwrap();
    assert_eq!(summary.events, 2);
    assert_eq!(kinds(&model), vec!["SYSTEM_START", "SYSTEM_END"]);

    let missing = TraceImporter::new(model).import_file(file.path().with_extension("missing"));
    assert!(matches!(missing, Err(ImportError::Io(_))));
}
