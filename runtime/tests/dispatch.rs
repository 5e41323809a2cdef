//! End-to-end dispatch behavior over a small folder domain.
//!
//! Covers routing, duplicate detection, transactional atomicity, audit
//! completeness, correlation propagation, fan-out ordering, routing
//! failures, the undeclared-event flag, the fan-out abort policy, and the
//! recursion depth guard.

use scriptorium_core::command::{Command, CommandHandler, Query, QueryHandler};
use scriptorium_core::event::{DomainEvent, EventQueue, EventType};
use scriptorium_core::record::EventLog;
use scriptorium_runtime::{
    CommandInvoker, DispatchConfig, DispatchContext, DispatchError, HandlerKind, HandlerRegistry,
    Policy, PolicyBinder, PolicyEngine, PolicyFlow, QueryInvoker,
};
use scriptorium_testing::{InMemoryEventLog, MemoryDb, init_test_tracing, test_clock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

//
// ===== Fixture domain: folders =====
//

#[derive(Clone, Debug, Default)]
struct FolderState {
    next_id: u64,
    folders: BTreeMap<u64, String>,
    marks: Vec<String>,
}

type FolderDb = MemoryDb<FolderState>;

#[derive(Debug, Serialize)]
struct CreateFolderCommand {
    name: String,
}

impl Command for CreateFolderCommand {
    type Output = u64;
}

#[derive(Debug, Serialize)]
struct FolderCreatedEvent {
    folder_id: u64,
    name: String,
}

impl DomainEvent for FolderCreatedEvent {}

struct CreateFolderHandler {
    db: FolderDb,
}

impl CommandHandler<CreateFolderCommand> for CreateFolderHandler {
    fn handle(&self, queue: &mut EventQueue, command: CreateFolderCommand) -> anyhow::Result<u64> {
        let folder_id = self.db.write(|state| {
            state.next_id += 1;
            state.folders.insert(state.next_id, command.name.clone());
            state.next_id
        });
        queue.append(FolderCreatedEvent {
            folder_id,
            name: command.name,
        });
        Ok(folder_id)
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<FolderCreatedEvent>()]
    }
}

#[derive(Debug, Serialize)]
struct StampFolderCommand {
    folder_id: u64,
}

impl Command for StampFolderCommand {
    type Output = ();
}

#[derive(Debug, Serialize)]
struct FolderStampedEvent {
    folder_id: u64,
}

impl DomainEvent for FolderStampedEvent {}

struct StampFolderHandler {
    db: FolderDb,
}

impl CommandHandler<StampFolderCommand> for StampFolderHandler {
    fn handle(&self, queue: &mut EventQueue, command: StampFolderCommand) -> anyhow::Result<()> {
        let found = self.db.write(|state| {
            state.folders.get_mut(&command.folder_id).map(|name| {
                name.push_str(" [stamped]");
            })
        });
        anyhow::ensure!(
            found.is_some(),
            "Folder with id {} not found",
            command.folder_id
        );
        queue.append(FolderStampedEvent {
            folder_id: command.folder_id,
        });
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<FolderStampedEvent>()]
    }
}

#[derive(Debug, Serialize)]
struct MarkCommand {
    label: String,
}

impl Command for MarkCommand {
    type Output = ();
}

#[derive(Debug, Serialize)]
struct MarkAddedEvent {
    label: String,
}

impl DomainEvent for MarkAddedEvent {}

struct MarkHandler {
    db: FolderDb,
}

impl CommandHandler<MarkCommand> for MarkHandler {
    fn handle(&self, queue: &mut EventQueue, command: MarkCommand) -> anyhow::Result<()> {
        self.db.write(|state| state.marks.push(command.label.clone()));
        queue.append(MarkAddedEvent {
            label: command.label,
        });
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<MarkAddedEvent>()]
    }
}

/// Emits its two events in a fixed order; fan-out order tests hang off it.
#[derive(Debug, Serialize)]
struct RotateFoldersCommand;

impl Command for RotateFoldersCommand {
    type Output = ();
}

#[derive(Debug, Serialize)]
struct RotationStartedEvent;

impl DomainEvent for RotationStartedEvent {}

#[derive(Debug, Serialize)]
struct RotationFinishedEvent;

impl DomainEvent for RotationFinishedEvent {}

struct RotateFoldersHandler;

impl CommandHandler<RotateFoldersCommand> for RotateFoldersHandler {
    fn handle(&self, queue: &mut EventQueue, _command: RotateFoldersCommand) -> anyhow::Result<()> {
        queue.append(RotationStartedEvent);
        queue.append(RotationFinishedEvent);
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![
            EventType::of::<RotationStartedEvent>(),
            EventType::of::<RotationFinishedEvent>(),
        ]
    }
}

/// Mutates state, then fails. Nothing it did may survive.
#[derive(Debug, Serialize)]
struct BrokenCommand;

impl Command for BrokenCommand {
    type Output = ();
}

struct BrokenHandler {
    db: FolderDb,
}

impl CommandHandler<BrokenCommand> for BrokenHandler {
    fn handle(&self, queue: &mut EventQueue, _command: BrokenCommand) -> anyhow::Result<()> {
        self.db.write(|state| {
            state.next_id += 1;
            state.folders.insert(state.next_id, "doomed".to_string());
        });
        queue.append(FolderCreatedEvent {
            folder_id: 0,
            name: "doomed".to_string(),
        });
        anyhow::bail!("folder quota exceeded")
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<FolderCreatedEvent>()]
    }
}

/// Emits an event its declaration never mentions.
#[derive(Debug, Serialize)]
struct SurpriseCommand;

impl Command for SurpriseCommand {
    type Output = ();
}

#[derive(Debug, Serialize)]
struct UndeclaredEvent;

impl DomainEvent for UndeclaredEvent {}

struct SurpriseHandler;

impl CommandHandler<SurpriseCommand> for SurpriseHandler {
    fn handle(&self, queue: &mut EventQueue, _command: SurpriseCommand) -> anyhow::Result<()> {
        queue.append(UndeclaredEvent);
        Ok(())
    }
}

/// Declares an event it never emits.
#[derive(Debug, Serialize)]
struct QuietCommand;

impl Command for QuietCommand {
    type Output = ();
}

struct QuietHandler;

impl CommandHandler<QuietCommand> for QuietHandler {
    fn handle(&self, _queue: &mut EventQueue, _command: QuietCommand) -> anyhow::Result<()> {
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<FolderCreatedEvent>()]
    }
}

/// Never registered anywhere.
#[derive(Debug, Serialize)]
struct OrphanCommand;

impl Command for OrphanCommand {
    type Output = ();
}

#[derive(Debug, Serialize)]
struct EchoCommand;

impl Command for EchoCommand {
    type Output = ();
}

#[derive(Debug, Serialize)]
struct EchoedEvent;

impl DomainEvent for EchoedEvent {}

struct EchoHandler;

impl CommandHandler<EchoCommand> for EchoHandler {
    fn handle(&self, queue: &mut EventQueue, _command: EchoCommand) -> anyhow::Result<()> {
        queue.append(EchoedEvent);
        Ok(())
    }

    fn declared_events(&self) -> Vec<EventType> {
        vec![EventType::of::<EchoedEvent>()]
    }
}

#[derive(Debug)]
struct CountFoldersQuery;

impl Query for CountFoldersQuery {
    type Output = usize;
}

struct CountFoldersHandler {
    db: FolderDb,
}

impl QueryHandler<CountFoldersQuery> for CountFoldersHandler {
    fn handle(&self, _query: CountFoldersQuery) -> anyhow::Result<usize> {
        Ok(self.db.read(|state| state.folders.len()))
    }
}

/// A query handler that mistakenly writes. The read-only scope must
/// swallow the mutation.
#[derive(Debug)]
struct NaughtyQuery;

impl Query for NaughtyQuery {
    type Output = ();
}

struct NaughtyHandler {
    db: FolderDb,
}

impl QueryHandler<NaughtyQuery> for NaughtyHandler {
    fn handle(&self, _query: NaughtyQuery) -> anyhow::Result<()> {
        self.db.write(|state| {
            state.folders.insert(999, "sneaky".to_string());
        });
        Ok(())
    }
}

//
// ===== Fixture policies =====
//

struct WelcomeStampPolicy;

impl Policy for WelcomeStampPolicy {
    fn flows(&self) -> Vec<PolicyFlow> {
        vec![PolicyFlow::of::<FolderCreatedEvent, StampFolderCommand>()]
    }
}

impl WelcomeStampPolicy {
    fn stamp_created_folder(
        &self,
        ctx: &DispatchContext<'_>,
        event: &FolderCreatedEvent,
    ) -> anyhow::Result<()> {
        ctx.invoke(StampFolderCommand {
            folder_id: event.folder_id,
        })?;
        Ok(())
    }
}

struct RotationPolicy;

impl Policy for RotationPolicy {}

impl RotationPolicy {
    fn mark_started(
        &self,
        ctx: &DispatchContext<'_>,
        _event: &RotationStartedEvent,
    ) -> anyhow::Result<()> {
        ctx.invoke(MarkCommand {
            label: "started".to_string(),
        })?;
        Ok(())
    }

    fn mark_finished(
        &self,
        ctx: &DispatchContext<'_>,
        _event: &RotationFinishedEvent,
    ) -> anyhow::Result<()> {
        ctx.invoke(MarkCommand {
            label: "finished".to_string(),
        })?;
        Ok(())
    }
}

struct FlakyPolicy;

impl Policy for FlakyPolicy {}

impl FlakyPolicy {
    fn explode(
        &self,
        _ctx: &DispatchContext<'_>,
        _event: &FolderCreatedEvent,
    ) -> anyhow::Result<()> {
        anyhow::bail!("listener exploded")
    }
}

struct EchoPolicy;

impl Policy for EchoPolicy {}

impl EchoPolicy {
    fn echo_again(&self, ctx: &DispatchContext<'_>, _event: &EchoedEvent) -> anyhow::Result<()> {
        ctx.invoke(EchoCommand)?;
        Ok(())
    }
}

//
// ===== Assembly =====
//

struct Fixture {
    invoker: CommandInvoker,
    queries: QueryInvoker,
    db: FolderDb,
    log: Arc<InMemoryEventLog>,
}

#[allow(clippy::expect_used)] // Panics: fixture registration has no duplicates
fn registry(db: &FolderDb) -> HandlerRegistry {
    HandlerRegistry::builder()
        .command::<CreateFolderCommand, _>(CreateFolderHandler { db: db.clone() })
        .command::<StampFolderCommand, _>(StampFolderHandler { db: db.clone() })
        .command::<MarkCommand, _>(MarkHandler { db: db.clone() })
        .command::<RotateFoldersCommand, _>(RotateFoldersHandler)
        .command::<BrokenCommand, _>(BrokenHandler { db: db.clone() })
        .command::<SurpriseCommand, _>(SurpriseHandler)
        .command::<QuietCommand, _>(QuietHandler)
        .command::<EchoCommand, _>(EchoHandler)
        .query::<CountFoldersQuery, _>(CountFoldersHandler { db: db.clone() })
        .query::<NaughtyQuery, _>(NaughtyHandler { db: db.clone() })
        .build()
        .expect("fixture registry has no duplicates")
}

fn fixture(policies: PolicyEngine) -> Fixture {
    init_test_tracing();
    let db = MemoryDb::new(FolderState::default());
    let registry = Arc::new(registry(&db));
    let log = Arc::new(InMemoryEventLog::new());
    let invoker = CommandInvoker::new(
        Arc::clone(&registry),
        Arc::new(policies),
        Arc::clone(&log) as Arc<dyn EventLog>,
        Arc::new(db.clone()),
    )
    .with_clock(Arc::new(test_clock()));
    let queries = QueryInvoker::new(registry, Arc::new(db.clone()));
    Fixture {
        invoker,
        queries,
        db,
        log,
    }
}

fn record_types(log: &InMemoryEventLog) -> Vec<String> {
    log.records().into_iter().map(|r| r.event_type).collect()
}

//
// ===== Routing =====
//

#[test]
#[allow(clippy::expect_used)]
fn command_routes_to_its_single_handler() {
    let fx = fixture(PolicyEngine::empty());

    let folder_id = fx
        .invoker
        .invoke(CreateFolderCommand {
            name: "inbox".to_string(),
        })
        .expect("invoke should succeed");

    assert_eq!(folder_id, 1);
    assert_eq!(
        fx.db.read(|state| state.folders[&1].clone()),
        "inbox".to_string()
    );
}

#[test]
#[allow(clippy::panic)] // Panics: test fails on unexpected dispatch outcome
fn unregistered_command_fails_synchronously_with_known_types() {
    let fx = fixture(PolicyEngine::empty());

    let err = fx.invoker.invoke(OrphanCommand);

    match err {
        Err(DispatchError::NoHandlerFound {
            kind,
            requested,
            known,
        }) => {
            assert_eq!(kind, HandlerKind::Command);
            assert_eq!(requested, "OrphanCommand");
            assert!(known.contains(&"CreateFolderCommand"));
        },
        other => panic!("expected NoHandlerFound, got {other:?}"),
    }
    // Routing failures never touch the audit log.
    assert!(fx.log.is_empty());
}

//
// ===== Transactional atomicity =====
//

#[test]
#[allow(clippy::panic)] // Panics: test fails on unexpected dispatch outcome
fn failed_handler_rolls_back_state_and_records_nothing() {
    let fx = fixture(PolicyEngine::empty());

    let err = fx.invoker.invoke(BrokenCommand);

    match err {
        Err(DispatchError::Domain { target, source }) => {
            assert_eq!(target, "BrokenCommand");
            // Business errors propagate verbatim.
            assert_eq!(source.to_string(), "folder quota exceeded");
        },
        other => panic!("expected Domain error, got {other:?}"),
    }
    assert!(fx.db.read(|state| state.folders.is_empty()));
    assert!(fx.log.is_empty());
}

//
// ===== Audit =====
//

#[test]
#[allow(clippy::expect_used)]
fn declared_and_emitted_event_is_recorded_exactly_once() {
    let fx = fixture(PolicyEngine::empty());

    fx.invoker
        .invoke(CreateFolderCommand {
            name: "inbox".to_string(),
        })
        .expect("invoke should succeed");

    let records = fx
        .log
        .find_by_type("FolderCreatedEvent", 10)
        .expect("find should succeed");
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert!(!records[0].undeclared);
    assert_eq!(records[0].payload["name"], "inbox");
}

#[test]
#[allow(clippy::expect_used)]
fn command_record_leads_its_event_records() {
    let fx = fixture(PolicyEngine::empty());

    fx.invoker
        .invoke(CreateFolderCommand {
            name: "inbox".to_string(),
        })
        .expect("invoke should succeed");

    assert_eq!(
        record_types(&fx.log),
        vec!["CreateFolderCommand", "FolderCreatedEvent"]
    );
}

#[test]
#[allow(clippy::expect_used)]
fn undeclared_event_is_recorded_and_flagged() {
    let fx = fixture(PolicyEngine::empty());

    fx.invoker
        .invoke(SurpriseCommand)
        .expect("invoke should succeed");

    let records = fx
        .log
        .find_by_type("UndeclaredEvent", 10)
        .expect("find should succeed");
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert!(records[0].undeclared);
}

#[test]
#[allow(clippy::expect_used)]
fn declared_but_unemitted_event_is_not_recorded() {
    let fx = fixture(PolicyEngine::empty());

    fx.invoker
        .invoke(QuietCommand)
        .expect("invoke should succeed");

    // Only the command's own audit record exists.
    assert_eq!(record_types(&fx.log), vec!["QuietCommand"]);
}

/// An event log whose writes always fail, for the audit-inconsistency path.
#[derive(Debug, Default)]
struct BrokenEventLog;

impl EventLog for BrokenEventLog {
    fn append(
        &self,
        _record: scriptorium_core::record::NewEventRecord,
    ) -> Result<scriptorium_core::record::EventRecord, scriptorium_core::record::EventLogError>
    {
        Err(scriptorium_core::record::EventLogError::Storage(
            "disk full".to_string(),
        ))
    }

    fn find_by_type(
        &self,
        _event_type: &str,
        _limit: usize,
    ) -> Result<Vec<scriptorium_core::record::EventRecord>, scriptorium_core::record::EventLogError>
    {
        Ok(Vec::new())
    }

    fn find_by_request_id(
        &self,
        _request_id: &scriptorium_core::record::RequestId,
    ) -> Result<Vec<scriptorium_core::record::EventRecord>, scriptorium_core::record::EventLogError>
    {
        Ok(Vec::new())
    }
}

#[test]
#[allow(clippy::panic)] // Panics: test fails on unexpected dispatch outcome
fn audit_failure_after_commit_surfaces_without_undoing_state() {
    init_test_tracing();
    let db = MemoryDb::new(FolderState::default());
    let invoker = CommandInvoker::new(
        Arc::new(registry(&db)),
        Arc::new(PolicyEngine::empty()),
        Arc::new(BrokenEventLog),
        Arc::new(db.clone()),
    );

    let err = invoker.invoke(CreateFolderCommand {
        name: "inbox".to_string(),
    });

    match err {
        Err(DispatchError::EventPersistence { command, .. }) => {
            assert_eq!(command, "CreateFolderCommand");
        },
        other => panic!("expected EventPersistence, got {other:?}"),
    }
    // The committed mutation is never rolled back in response.
    assert_eq!(db.read(|state| state.folders.len()), 1);
}

//
// ===== Correlation and chaining =====
//

#[test]
#[allow(clippy::expect_used)]
fn policy_chain_shares_one_request_id_and_orders_records() {
    let policy = Arc::new(WelcomeStampPolicy);
    let fx = fixture(
        PolicyBinder::new()
            .policy(&policy)
            .listen(
                &policy,
                "stamp_created_folder",
                WelcomeStampPolicy::stamp_created_folder,
            )
            .build(),
    );

    fx.invoker
        .invoke(CreateFolderCommand {
            name: "inbox".to_string(),
        })
        .expect("invoke should succeed");

    // The policy-triggered command ran against committed state.
    assert_eq!(
        fx.db.read(|state| state.folders[&1].clone()),
        "inbox [stamped]".to_string()
    );

    let records = fx.log.records();
    let request_id = records[0].request_id;
    assert!(records.iter().all(|r| r.request_id == request_id));

    assert_eq!(
        record_types(&fx.log),
        vec![
            "CreateFolderCommand",
            "FolderCreatedEvent",
            "FolderCreatedEvent > WelcomeStampPolicy > StampFolderCommand",
            "FolderStampedEvent",
        ]
    );
}

#[test]
#[allow(clippy::expect_used)]
fn sibling_events_fan_out_sequentially_in_emission_order() {
    let policy = Arc::new(RotationPolicy);
    let fx = fixture(
        PolicyBinder::new()
            .policy(&policy)
            .listen(&policy, "mark_started", RotationPolicy::mark_started)
            .listen(&policy, "mark_finished", RotationPolicy::mark_finished)
            .build(),
    );

    fx.invoker
        .invoke(RotateFoldersCommand)
        .expect("invoke should succeed");

    // All side effects of the first event's listeners land before any of
    // the second event's listeners begin.
    assert_eq!(
        fx.db.read(|state| state.marks.clone()),
        vec!["started".to_string(), "finished".to_string()]
    );
    assert_eq!(
        record_types(&fx.log),
        vec![
            "RotateFoldersCommand",
            "RotationStartedEvent",
            "RotationFinishedEvent",
            "RotationStartedEvent > RotationPolicy > MarkCommand",
            "MarkAddedEvent",
            "RotationFinishedEvent > RotationPolicy > MarkCommand",
            "MarkAddedEvent",
        ]
    );
}

//
// ===== Fan-out failure semantics =====
//

#[test]
#[allow(clippy::panic)] // Panics: test fails on unexpected dispatch outcome
fn listener_failure_aborts_remaining_listeners_but_keeps_commit() {
    let flaky = Arc::new(FlakyPolicy);
    let stamp = Arc::new(WelcomeStampPolicy);
    let fx = fixture(
        PolicyBinder::new()
            .policy(&flaky)
            .policy(&stamp)
            .listen(&flaky, "explode", FlakyPolicy::explode)
            .listen(
                &stamp,
                "stamp_created_folder",
                WelcomeStampPolicy::stamp_created_folder,
            )
            .build(),
    );

    let err = fx.invoker.invoke(CreateFolderCommand {
        name: "inbox".to_string(),
    });

    match err {
        Err(DispatchError::FanOut {
            event_type,
            policy,
            listener,
            source,
        }) => {
            assert_eq!(event_type, "FolderCreatedEvent");
            assert_eq!(policy, "FlakyPolicy");
            assert_eq!(listener, "explode");
            assert_eq!(source.to_string(), "listener exploded");
        },
        other => panic!("expected FanOut error, got {other:?}"),
    }

    // The triggering command had already committed; the second listener
    // never ran.
    assert_eq!(
        fx.db.read(|state| state.folders[&1].clone()),
        "inbox".to_string()
    );
}

#[test]
#[allow(clippy::panic)] // Panics: test fails on unexpected dispatch outcome
fn cyclic_policy_graph_trips_the_depth_guard() {
    let policy = Arc::new(EchoPolicy);
    let fx = fixture(
        PolicyBinder::new()
            .policy(&policy)
            .listen(&policy, "echo_again", EchoPolicy::echo_again)
            .build(),
    );
    let invoker = fx
        .invoker
        .with_config(DispatchConfig::new().with_max_dispatch_depth(5));

    let err = invoker.invoke(EchoCommand);

    let message = match err {
        Err(source) => source.to_string(),
        Ok(()) => panic!("cycle must not terminate normally"),
    };
    assert!(message.contains("exceeds the configured limit 5"));
}

//
// ===== Queries =====
//

#[test]
#[allow(clippy::expect_used)]
fn queries_read_committed_state_without_audit_records() {
    let fx = fixture(PolicyEngine::empty());
    fx.invoker
        .invoke(CreateFolderCommand {
            name: "inbox".to_string(),
        })
        .expect("invoke should succeed");
    let audit_len = fx.log.len();

    let count = fx
        .queries
        .invoke(CountFoldersQuery)
        .expect("query should succeed");

    assert_eq!(count, 1);
    assert_eq!(fx.log.len(), audit_len);
}

#[test]
#[allow(clippy::expect_used)]
fn read_only_scope_discards_accidental_query_writes() {
    let fx = fixture(PolicyEngine::empty());

    fx.queries
        .invoke(NaughtyQuery)
        .expect("query should succeed");

    assert!(fx.db.read(|state| state.folders.is_empty()));
}

#[test]
#[allow(clippy::panic)] // Panics: test fails on unexpected dispatch outcome
fn unregistered_query_fails_with_known_types() {
    #[derive(Debug)]
    struct OrphanQuery;
    impl Query for OrphanQuery {
        type Output = ();
    }

    let fx = fixture(PolicyEngine::empty());
    let err = fx.queries.invoke(OrphanQuery);

    match err {
        Err(DispatchError::NoHandlerFound {
            kind, requested, ..
        }) => {
            assert_eq!(kind, HandlerKind::Query);
            assert_eq!(requested, "OrphanQuery");
        },
        other => panic!("expected NoHandlerFound, got {other:?}"),
    }
}

//
// ===== Flow metadata =====
//

#[test]
fn flow_report_lists_declared_edges() {
    let policy = Arc::new(WelcomeStampPolicy);
    let fx = fixture(
        PolicyBinder::new()
            .policy(&policy)
            .listen(
                &policy,
                "stamp_created_folder",
                WelcomeStampPolicy::stamp_created_folder,
            )
            .build(),
    );

    let report = fx.invoker.flow();

    assert!(report
        .command_events
        .iter()
        .any(|f| f.command == "CreateFolderCommand" && f.events == vec!["FolderCreatedEvent"]));
    assert_eq!(report.policy_commands.len(), 1);
    assert_eq!(report.policy_commands[0].policy, "WelcomeStampPolicy");
    assert_eq!(
        report.policy_commands[0].to_command,
        "StampFolderCommand"
    );
}
