// Contour - Execution Trace Reconstruction
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Offline producer replaying recorded logs into an execution model

use std::{
    collections::{HashMap, HashSet},
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::Arc,
};

use contour_common::types::{
    ContourId, EventOrigin, MemberKind, NewEvent, TypeNode, Value, ValueId, SYSTEM_THREAD_NAME,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    EngineConfig, EventFactory, ExecutionModel, ImportError, ModelStore, Record, RecordReader,
    ResolverChain, Signature, TypeRegistry, DEFAULT_BATCH_SIZE,
};

/// Kinds that are recognized but not replayed
pub const UNSUPPORTED_KINDS: &[&str] =
    &["EXCEPTION_THROW", "EXCEPTION_CATCH", "LOCK", "DESTROY", "METHOD_RETURNED"];

/// Record kinds the importer replays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// `SYSTEM_START`
    SystemStart,
    /// `SYSTEM_END`
    SystemEnd,
    /// `THREAD_END`
    ThreadEnd,
    /// `TYPE_LOAD`
    TypeLoad,
    /// `METHOD_CALL`
    MethodCall,
    /// `METHOD_ENTERED`
    MethodEntered,
    /// `METHOD_EXIT`
    MethodExit,
    /// `OBJECT_NEW`
    ObjectNew,
    /// `FIELD_READ`
    FieldRead,
    /// `FIELD_WRITE`
    FieldWrite,
    /// `VAR_ASSIGN`
    VarAssign,
    /// `VAR_DELETE`
    VarDelete,
    /// `LINE_STEP`
    LineStep,
}

impl RecordKind {
    /// Map a record kind name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "SYSTEM_START" => Self::SystemStart,
            "SYSTEM_END" => Self::SystemEnd,
            "THREAD_END" => Self::ThreadEnd,
            "TYPE_LOAD" => Self::TypeLoad,
            "METHOD_CALL" => Self::MethodCall,
            "METHOD_ENTERED" => Self::MethodEntered,
            "METHOD_EXIT" => Self::MethodExit,
            "OBJECT_NEW" => Self::ObjectNew,
            "FIELD_READ" => Self::FieldRead,
            "FIELD_WRITE" => Self::FieldWrite,
            "VAR_ASSIGN" => Self::VarAssign,
            "VAR_DELETE" => Self::VarDelete,
            "LINE_STEP" => Self::LineStep,
            _ => return None,
        })
    }

    /// Record kind name
    pub fn name(&self) -> &'static str {
        match self {
            Self::SystemStart => "SYSTEM_START",
            Self::SystemEnd => "SYSTEM_END",
            Self::ThreadEnd => "THREAD_END",
            Self::TypeLoad => "TYPE_LOAD",
            Self::MethodCall => "METHOD_CALL",
            Self::MethodEntered => "METHOD_ENTERED",
            Self::MethodExit => "METHOD_EXIT",
            Self::ObjectNew => "OBJECT_NEW",
            Self::FieldRead => "FIELD_READ",
            Self::FieldWrite => "FIELD_WRITE",
            Self::VarAssign => "VAR_ASSIGN",
            Self::VarDelete => "VAR_DELETE",
            Self::LineStep => "LINE_STEP",
        }
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Records read from the log
    pub records: usize,
    /// Records skipped with a diagnostic
    pub skipped: usize,
    /// Events appended to the model
    pub events: usize,
    /// Batches appended to the model
    pub batches: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records ({} skipped), {} events in {} batches",
            self.records, self.skipped, self.events, self.batches
        )
    }
}

/// Per-import replay state
#[derive(Debug, Default)]
struct ReplayState {
    stacks: HashMap<ValueId, Vec<ContourId>>,
    called: HashSet<ValueId>,
    objects: HashMap<(String, u64), ContourId>,
}

/// Rebuilds an execution model from a recorded log
///
/// Records are replayed in order. Events are buffered and appended in batches
/// of a fixed size; the remainder is appended at the end of the log. A fault
/// aborts the import after appending the events of every record replayed
/// before it. The faulty record itself leaves the model untouched.
#[derive(Debug)]
pub struct TraceImporter {
    model: Arc<ExecutionModel>,
    batch_size: usize,
    state: ReplayState,
    pending: Vec<NewEvent>,
    summary: ImportSummary,
}

impl TraceImporter {
    /// Create an importer appending batches of [`DEFAULT_BATCH_SIZE`]
    pub fn new(model: Arc<ExecutionModel>) -> Self {
        Self {
            model,
            batch_size: DEFAULT_BATCH_SIZE,
            state: ReplayState::default(),
            pending: Vec::new(),
            summary: ImportSummary::default(),
        }
    }

    /// Create an importer configured by `config`
    pub fn from_config(model: Arc<ExecutionModel>, config: &EngineConfig) -> Self {
        Self::new(model).with_batch_size(config.batch_size)
    }

    /// Set the batch size (values below 1 are raised to 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The model being fed
    pub fn model(&self) -> &Arc<ExecutionModel> {
        &self.model
    }

    /// Import a log file
    pub fn import_file(&mut self, path: impl AsRef<Path>) -> Result<ImportSummary, ImportError> {
        let path = path.as_ref();
        info!(path = %path.display(), "importing trace log");
        let file = File::open(path)?;
        self.import_reader(BufReader::new(file))
    }

    /// Import a log held in memory
    pub fn import_str(&mut self, text: &str) -> Result<ImportSummary, ImportError> {
        self.import_reader(text.as_bytes())
    }

    /// Import a log from a reader
    pub fn import_reader<R: BufRead>(&mut self, reader: R) -> Result<ImportSummary, ImportError> {
        self.state = ReplayState::default();
        self.pending.clear();
        self.summary = ImportSummary::default();

        let mut records = RecordReader::new(reader);
        let replayed = self.replay(&mut records);
        self.summary.records = records.records_read();

        // Contours created so far must not outlive their events
        let batch = std::mem::take(&mut self.pending);
        let flushed = if batch.is_empty() { Ok(()) } else { self.flush(batch) };
        if let Err(err) = &replayed {
            warn!(error = %err, summary = %self.summary, "import aborted");
        }
        replayed.and(flushed)?;

        info!(summary = %self.summary, "import finished");
        Ok(self.summary)
    }

    fn replay<R: BufRead>(&mut self, records: &mut RecordReader<R>) -> Result<(), ImportError> {
        let model = self.model.clone();
        while let Some(record) = records.next_record()? {
            let Some(kind) = classify(&record) else {
                self.summary.skipped += 1;
                continue;
            };

            model.with_store_mut(|store, resolver| {
                let step = Step::parse(&record, kind, store, &self.state)?;
                Replay {
                    store,
                    resolver,
                    runtime: model.runtime_types(),
                    state: &mut self.state,
                    out: &mut self.pending,
                }
                .apply(step);
                Ok::<_, ImportError>(())
            })?;

            while self.pending.len() >= self.batch_size {
                let batch: Vec<NewEvent> = self.pending.drain(..self.batch_size).collect();
                self.flush(batch)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self, batch: Vec<NewEvent>) -> Result<(), ImportError> {
        let appended = self.model.append(batch)?;
        self.summary.events += appended;
        self.summary.batches += 1;
        debug!(appended, batch = self.summary.batches, "appended batch");
        Ok(())
    }
}

fn classify(record: &Record) -> Option<RecordKind> {
    let Some(name) = record.kind() else {
        warn!(record = record.position(), "record without a kind, skipping");
        return None;
    };
    if let Some(kind) = RecordKind::from_name(name) {
        return Some(kind);
    }

    if UNSUPPORTED_KINDS.contains(&name) {
        warn!(record = record.position(), kind = name, "unsupported event kind, skipping");
    } else {
        warn!(record = record.position(), kind = name, "unknown event kind, skipping");
    }
    None
}

/// Object id in hexadecimal, with or without a `0x` prefix
fn parse_hex(text: &str) -> Option<u64> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

/// `Type@hex` object notation
fn parse_object(text: &str) -> Option<(&str, u64)> {
    let (type_name, oid) = text.rsplit_once('@')?;
    if type_name.is_empty() {
        return None;
    }
    Some((type_name, parse_hex(oid)?))
}

/// Thread a record runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadField<'r> {
    System,
    /// Thread id, with the name when the record carries one
    Numbered(u64, Option<&'r str>),
}

impl ThreadField<'_> {
    /// Thread value already in the store. An unnamed thread is the last one
    /// interned for its id.
    fn existing(&self, store: &ModelStore) -> Option<ValueId> {
        match *self {
            Self::System => Some(ValueId::SYSTEM_THREAD),
            Self::Numbered(id, Some(name)) => {
                store.values.lookup(&Value::Thread { id, name: name.to_string() })
            }
            Self::Numbered(id, None) => store.values.lookup_thread(id),
        }
    }
}

/// Owner of an accessed field
#[derive(Debug)]
enum Owner<'r> {
    Object(String, u64),
    Static(&'r str),
}

/// What a record does, with every field parsed
#[derive(Debug)]
enum Action<'r> {
    SystemStart,
    SystemEnd,
    ThreadEnd,
    TypeLoad { type_name: &'r str, supertype: Option<&'r str> },
    MethodCall { signature: Signature, receiver: Option<(String, u64)> },
    MethodEntered { frame: ContourId },
    MethodExit { value: Option<&'r str> },
    ObjectNew { type_name: &'r str, oid: u64, length: Option<usize> },
    Field { read: bool, owner: Owner<'r>, field: &'r str, value: Option<&'r str> },
    VarAssign { frame: ContourId, variable: &'r str, value: Option<&'r str> },
    VarDelete { frame: ContourId, variable: &'r str },
    LineStep,
}

/// A validated record. Replaying it cannot fail.
#[derive(Debug)]
struct Step<'r> {
    thread: ThreadField<'r>,
    line: Option<(&'r str, u32)>,
    action: Action<'r>,
}

impl<'r> Step<'r> {
    /// Check every field of `record` against the current stores, without
    /// changing them
    fn parse(
        record: &'r Record,
        kind: RecordKind,
        store: &ModelStore,
        state: &ReplayState,
    ) -> Result<Self, ImportError> {
        let thread = match record.get("thread") {
            None | Some(SYSTEM_THREAD_NAME) => ThreadField::System,
            Some(text) => {
                let id = text
                    .parse()
                    .map_err(|_| record.malformed(format!("invalid thread `{text}`")))?;
                ThreadField::Numbered(id, record.get("threadName"))
            }
        };

        let file = record.get("file");
        let line = match record.get("line") {
            Some(text) => Some(
                text.parse::<u32>()
                    .map_err(|_| record.malformed(format!("invalid line `{text}`")))?,
            ),
            None => None,
        };
        let line = match (file, line) {
            (None, None) => None,
            (file, line) => Some((file.unwrap_or_default(), line.unwrap_or(0))),
        };

        let frame = || -> Result<ContourId, ImportError> {
            thread
                .existing(store)
                .and_then(|thread| state.stacks.get(&thread))
                .and_then(|frames| frames.last())
                .copied()
                .ok_or_else(|| underflow(record, kind))
        };

        let action = match kind {
            RecordKind::SystemStart => Action::SystemStart,
            RecordKind::SystemEnd => Action::SystemEnd,
            RecordKind::ThreadEnd => Action::ThreadEnd,
            RecordKind::TypeLoad => Action::TypeLoad {
                type_name: record.require("type")?,
                supertype: record.get("supertype"),
            },
            RecordKind::MethodCall => {
                let text = record.require("signature")?;
                let signature = Signature::parse(text).ok_or_else(|| ImportError::Signature {
                    record: record.position(),
                    text: text.to_string(),
                })?;
                let receiver = record.get("target").and_then(|target| {
                    parse_object(target)
                        .map(|(type_name, oid)| (type_name.to_string(), oid))
                        .or_else(|| parse_hex(target).map(|oid| (signature.type_name.clone(), oid)))
                });
                Action::MethodCall { signature, receiver }
            }
            RecordKind::MethodEntered => Action::MethodEntered { frame: frame()? },
            RecordKind::MethodExit => {
                frame()?;
                Action::MethodExit { value: record.get("value") }
            }
            RecordKind::ObjectNew => {
                let type_name = record.require("type")?;
                let oid = parse_oid(record, record.require("object")?)?;
                let length = match record.get("size").or_else(|| record.get("elements")) {
                    Some(text) => Some(text.parse::<usize>().map_err(|_| {
                        record.malformed(format!("invalid array length `{text}`"))
                    })?),
                    None => None,
                };
                Action::ObjectNew { type_name, oid, length }
            }
            RecordKind::FieldRead | RecordKind::FieldWrite => {
                let field = record.require("field")?;
                let owner = match record.get("object") {
                    Some(object) => match parse_object(object) {
                        Some((type_name, oid)) => Owner::Object(type_name.to_string(), oid),
                        None => Owner::Object(
                            record.require("type")?.to_string(),
                            parse_oid(record, object)?,
                        ),
                    },
                    None => Owner::Static(record.require("type")?),
                };
                Action::Field {
                    read: kind == RecordKind::FieldRead,
                    owner,
                    field,
                    value: record.get("value"),
                }
            }
            RecordKind::VarAssign => Action::VarAssign {
                variable: record.require("variable")?,
                frame: frame()?,
                value: record.get("value"),
            },
            RecordKind::VarDelete => Action::VarDelete {
                variable: record.require("variable")?,
                frame: frame()?,
            },
            RecordKind::LineStep => Action::LineStep,
        };

        Ok(Self { thread, line, action })
    }
}

fn underflow(record: &Record, kind: RecordKind) -> ImportError {
    ImportError::StackUnderflow {
        record: record.position(),
        kind: kind.name(),
        thread: record.get("thread").unwrap_or(SYSTEM_THREAD_NAME).to_string(),
    }
}

fn parse_oid(record: &Record, text: &str) -> Result<u64, ImportError> {
    parse_hex(text)
        .ok_or_else(|| ImportError::InvalidOid { record: record.position(), text: text.to_string() })
}

/// Replay of a validated record, with the stores locked
struct Replay<'a> {
    store: &'a mut ModelStore,
    resolver: &'a ResolverChain,
    runtime: &'a TypeRegistry,
    state: &'a mut ReplayState,
    out: &'a mut Vec<NewEvent>,
}

impl Replay<'_> {
    fn apply(mut self, step: Step<'_>) {
        let origin = self.origin(&step);

        match step.action {
            Action::SystemStart => self.out.push(EventFactory::system_start(origin)),
            Action::SystemEnd => self.out.push(EventFactory::system_exit(origin)),
            Action::ThreadEnd => {
                let frames = self.state.stacks.remove(&origin.thread).unwrap_or_default();
                for contour in frames.into_iter().rev() {
                    self.out.push(EventFactory::method_exit(origin, contour, None));
                }
                self.out.push(EventFactory::thread_end(origin));
            }
            Action::TypeLoad { type_name, supertype } => {
                let mut node = TypeNode::class(type_name);
                node.supertype = supertype.map(str::to_string);
                self.runtime.register_type(node);
                self.static_contour(type_name, origin);
            }
            Action::MethodCall { signature, receiver } => {
                self.method_call(signature, receiver, origin)
            }
            Action::MethodEntered { frame } => {
                self.out.push(EventFactory::method_entered(origin, frame))
            }
            Action::MethodExit { value } => {
                let returned = value.map(|text| self.value(text));
                if let Some(contour) = self.state.stacks.get_mut(&origin.thread).and_then(Vec::pop) {
                    self.out.push(EventFactory::method_exit(origin, contour, returned));
                }
            }
            Action::ObjectNew { type_name, oid, length } => {
                self.create_object(type_name, oid, length, origin);
            }
            Action::Field { read, owner, field, value } => {
                let owner = match owner {
                    Owner::Object(type_name, oid) => self.object_contour(&type_name, oid, origin),
                    Owner::Static(type_name) => self.static_contour(type_name, origin),
                };
                let value = value.map_or(ValueId::UNINITIALIZED, |text| self.value(text));
                let member = if field.starts_with('[') { MemberKind::ArrayCell } else { MemberKind::Field };
                self.set_member(owner, field, member, value);

                let event = if read {
                    EventFactory::field_read(origin, owner, field, value)
                } else {
                    EventFactory::field_write(origin, owner, field, value)
                };
                self.out.push(event);
            }
            Action::VarAssign { frame, variable, value } => {
                let value = value.map_or(ValueId::UNINITIALIZED, |text| self.value(text));
                self.set_member(frame, variable, MemberKind::Local, value);
                self.out.push(EventFactory::var_assign(origin, frame, variable, value));
            }
            Action::VarDelete { frame, variable } => {
                if let Some(contour) = self.store.contours.get_mut(frame) {
                    contour.remove_member(variable);
                }
                self.out.push(EventFactory::var_delete(origin, frame, variable));
            }
            Action::LineStep => self.out.push(EventFactory::line_step(origin)),
        }
    }

    fn origin(&mut self, step: &Step<'_>) -> EventOrigin {
        let thread = match step.thread.existing(self.store) {
            Some(thread) => thread,
            None => match step.thread {
                ThreadField::System => ValueId::SYSTEM_THREAD,
                ThreadField::Numbered(id, name) => {
                    let name = name.map_or_else(|| format!("Thread-{id}"), str::to_string);
                    self.store.values.create_thread(id, name)
                }
            },
        };
        let line = match step.line {
            Some((file, line)) => self.store.values.create_line(file, line),
            None => ValueId::NULL,
        };
        EventOrigin::new(thread, line)
    }

    fn static_contour(&mut self, type_name: &str, origin: EventOrigin) -> ContourId {
        self.store.contours.retrieve_static_contour(self.resolver, type_name, origin, self.out)
    }

    /// Create a new object contour, remapping colliding oids
    fn create_object(
        &mut self,
        type_name: &str,
        oid: u64,
        length: Option<usize>,
        origin: EventOrigin,
    ) -> ContourId {
        let parent = self.static_contour(type_name, origin);
        let model_oid = self.store.contours.free_oid(type_name, oid);
        let (contour, _) =
            self.store.contours.retrieve_instance_contour(type_name, model_oid, length, Some(parent));

        self.state.objects.insert((type_name.to_string(), oid), contour);
        self.out.push(EventFactory::new_object(origin, contour));
        contour
    }

    /// Most recent contour imported for the raw pair, inferred on first sight
    fn object_contour(&mut self, type_name: &str, oid: u64, origin: EventOrigin) -> ContourId {
        match self.state.objects.get(&(type_name.to_string(), oid)) {
            Some(contour) => *contour,
            None => self.create_object(type_name, oid, None, origin),
        }
    }

    fn value(&mut self, text: &str) -> ValueId {
        if text == "null" {
            return ValueId::NULL;
        }
        match parse_object(text) {
            Some((type_name, oid)) => match self.state.objects.get(&(type_name.to_string(), oid)) {
                Some(contour) => self.store.values.create_contour_reference(*contour),
                None => self.store.values.create_resolved(text, type_name),
            },
            None => self.store.values.create_primitive(text),
        }
    }

    fn set_member(&mut self, contour: ContourId, name: &str, kind: MemberKind, value: ValueId) {
        if let Some(contour) = self.store.contours.get_mut(contour) {
            contour.set_member(name, kind, value);
        }
    }

    fn method_call(
        &mut self,
        signature: Signature,
        receiver: Option<(String, u64)>,
        origin: EventOrigin,
    ) {
        // The declaring type's static chain is loaded before the call
        let statics = self.static_contour(&signature.type_name, origin);
        let parent = match receiver {
            Some((type_name, oid)) => self.object_contour(&type_name, oid, origin),
            None => statics,
        };

        let top = self.state.stacks.get(&origin.thread).and_then(|frames| frames.last()).copied();
        let first_call = self.state.called.insert(origin.thread);
        let caller = match top {
            Some(contour) if !first_call => self.store.values.create_method_contour_reference(contour),
            _ => ValueId::SYSTEM_CALLER,
        };

        let contour = self.store.contours.create_method_contour(signature.key(), origin.thread, Some(parent));
        let target = self.store.values.create_method_contour_reference(contour);
        self.out.push(EventFactory::method_call(origin, caller, target));
        self.state.stacks.entry(origin.thread).or_default().push(contour);
    }
}
