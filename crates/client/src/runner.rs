// Drives an `AutoSaveScheduler` against a live transport.
//
// One runner per open document. Edits and save requests arrive on a
// channel, the scheduler decides, and at most one save task runs at a time.
// Each save gets a child of the shutdown token; a manual save cancels an
// in-flight auto-save through it and is submitted once that task settles.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docket_common::snapshot::DocumentSnapshot;
use docket_common::types::{Document, DocumentKind};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::autosave::{AutoSaveConfig, AutoSaveScheduler, ManualSave, SaveOutcome, SaveTrigger};
use crate::http::{ClientError, DocumentClient};
use crate::session::DocumentSession;

/// Where saves go. `DocumentClient` in production, a fake in tests.
pub trait SaveTransport: Send + Sync + 'static {
    fn load(
        &self,
        kind: DocumentKind,
        id: Uuid,
    ) -> impl Future<Output = Result<Document, ClientError>> + Send;

    /// Submit `snapshot`. Resolves to `ClientError::Cancelled` once `cancel` fires.
    fn save(
        &self,
        kind: DocumentKind,
        id: Uuid,
        snapshot: DocumentSnapshot,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Document, ClientError>> + Send;
}

impl SaveTransport for DocumentClient {
    async fn load(&self, kind: DocumentKind, id: Uuid) -> Result<Document, ClientError> {
        self.get(kind, id).await
    }

    async fn save(
        &self,
        kind: DocumentKind,
        id: Uuid,
        snapshot: DocumentSnapshot,
        cancel: CancellationToken,
    ) -> Result<Document, ClientError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.update(kind, id, &snapshot) => result,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunnerCommand {
    /// The local draft changed.
    Edited(DocumentSnapshot),
    SaveNow,
    /// After a conflict: drop local edits and take the server's document.
    Reload,
    /// After a conflict: keep local edits and save over the server's version.
    Overwrite,
}

#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// `superseded` is true when edits arrived while the save was in flight.
    Saved { document: Document, trigger: SaveTrigger, superseded: bool },
    Conflict { stored: Option<DateTime<Utc>> },
    Reloaded(Document),
    Failed { message: String },
}

struct InFlight {
    trigger: SaveTrigger,
    submitted: DocumentSnapshot,
    cancel: CancellationToken,
    handle: JoinHandle<Result<Document, ClientError>>,
}

pub struct AutoSaveRunner<T> {
    transport: Arc<T>,
    session: DocumentSession,
    scheduler: AutoSaveScheduler,
    draft: DocumentSnapshot,
    events: mpsc::UnboundedSender<RunnerEvent>,
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

async fn settle(in_flight: &mut Option<InFlight>) -> Result<Result<Document, ClientError>, JoinError> {
    match in_flight {
        Some(task) => (&mut task.handle).await,
        None => std::future::pending().await,
    }
}

impl<T: SaveTransport> AutoSaveRunner<T> {
    pub fn new(
        transport: Arc<T>,
        session: DocumentSession,
        config: AutoSaveConfig,
        events: mpsc::UnboundedSender<RunnerEvent>,
    ) -> Self {
        let draft = session.baseline_snapshot();
        Self { transport, session, scheduler: AutoSaveScheduler::new(config), draft, events }
    }

    /// Run until the command channel closes or `shutdown` fires.
    ///
    /// A closed channel flushes unsaved edits with one last save. Shutdown cancels the
    /// in-flight save and waits for it to settle. Returns the session with
    /// its latest baseline.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<RunnerCommand>,
        shutdown: CancellationToken,
    ) -> DocumentSession {
        let mut in_flight: Option<InFlight> = None;
        let mut closed = false;
        let mut flushed = false;

        loop {
            if closed && in_flight.is_none() {
                let flush = !flushed && self.scheduler.is_dirty() && !self.scheduler.is_halted();
                if !flush || self.scheduler.manual_save() != ManualSave::Submit {
                    break;
                }
                flushed = true;
                in_flight = Some(self.start(SaveTrigger::Manual, &shutdown));
            }

            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                _ = shutdown.cancelled(), if in_flight.is_none() => break,
                command = commands.recv(), if !closed => match command {
                    Some(command) => self.handle(command, &mut in_flight, &shutdown).await,
                    None => closed = true,
                },
                _ = sleep_until(deadline), if !closed => {
                    if let Some(trigger) = self.scheduler.poll_at(now()) {
                        in_flight = Some(self.start(trigger, &shutdown));
                    }
                }
                joined = settle(&mut in_flight) => {
                    let Some(task) = in_flight.take() else { continue };
                    if let Some(next) = self.finish(task.trigger, &task.submitted, joined) {
                        if shutdown.is_cancelled() {
                            break;
                        }
                        in_flight = Some(self.start(next, &shutdown));
                    } else if shutdown.is_cancelled() {
                        break;
                    }
                }
            }
        }

        self.session
    }

    async fn handle(
        &mut self,
        command: RunnerCommand,
        in_flight: &mut Option<InFlight>,
        shutdown: &CancellationToken,
    ) {
        match command {
            RunnerCommand::Edited(draft) => {
                self.draft = draft;
                self.scheduler.edit_at(now());
            }
            RunnerCommand::SaveNow => match self.scheduler.manual_save() {
                ManualSave::Submit => *in_flight = Some(self.start(SaveTrigger::Manual, shutdown)),
                ManualSave::CancelInFlight => {
                    if let Some(task) = in_flight.as_ref() {
                        task.cancel.cancel();
                    }
                }
                ManualSave::AlreadyQueued => {}
            },
            RunnerCommand::Reload | RunnerCommand::Overwrite if in_flight.is_some() => {
                self.emit(RunnerEvent::Failed {
                    message: "a save is in flight; try again once it settles".to_string(),
                });
            }
            RunnerCommand::Reload => {
                if let Some(latest) = self.load_latest().await {
                    self.session.adopt(latest.clone());
                    self.draft = self.session.baseline_snapshot();
                    self.scheduler.resolve_conflict_at(now(), false);
                    self.emit(RunnerEvent::Reloaded(latest));
                }
            }
            RunnerCommand::Overwrite => {
                if let Some(latest) = self.load_latest().await {
                    self.session.accept_overwrite(latest.modified_at);
                    self.scheduler.resolve_conflict_at(now(), true);
                    if self.scheduler.manual_save() == ManualSave::Submit {
                        *in_flight = Some(self.start(SaveTrigger::Manual, shutdown));
                    }
                }
            }
        }
    }

    async fn load_latest(&mut self) -> Option<Document> {
        match self.transport.load(self.session.kind(), self.session.id()).await {
            Ok(latest) => Some(latest),
            Err(error) => {
                warn!(error = %error, document_id = %self.session.id(), "failed to load latest document");
                self.emit(RunnerEvent::Failed { message: error.to_string() });
                None
            }
        }
    }

    fn start(&mut self, trigger: SaveTrigger, shutdown: &CancellationToken) -> InFlight {
        let cancel = shutdown.child_token();
        let snapshot = self.session.prepare(self.draft.clone());
        let transport = Arc::clone(&self.transport);
        let (kind, id) = (self.session.kind(), self.session.id());
        let task_cancel = cancel.clone();

        let submitted = snapshot.clone();
        let handle =
            tokio::spawn(async move { transport.save(kind, id, snapshot, task_cancel).await });
        InFlight { trigger, submitted, cancel, handle }
    }

    fn finish(
        &mut self,
        trigger: SaveTrigger,
        submitted: &DocumentSnapshot,
        joined: Result<Result<Document, ClientError>, JoinError>,
    ) -> Option<SaveTrigger> {
        let outcome = match joined {
            Ok(Ok(document)) => {
                let superseded = self.scheduler.is_dirty();
                self.session.record_save(submitted, document.clone());
                if !superseded {
                    self.draft = self.session.baseline_snapshot();
                }
                info!(
                    document_id = %document.id,
                    modified_at = %document.modified_at,
                    trigger = ?trigger,
                    "document saved"
                );
                self.emit(RunnerEvent::Saved { document, trigger, superseded });
                SaveOutcome::Saved
            }
            Ok(Err(ClientError::Cancelled)) => SaveOutcome::Cancelled,
            Ok(Err(ClientError::Conflict { stored, message })) => {
                warn!(document_id = %self.session.id(), %message, "save rejected as stale");
                self.emit(RunnerEvent::Conflict { stored });
                SaveOutcome::Conflict
            }
            Ok(Err(error)) => {
                warn!(error = %error, document_id = %self.session.id(), "save failed");
                self.emit(RunnerEvent::Failed { message: error.to_string() });
                SaveOutcome::Failed
            }
            Err(join_error) => {
                warn!(?join_error, "save task did not complete");
                self.emit(RunnerEvent::Failed { message: join_error.to_string() });
                SaveOutcome::Failed
            }
        };

        self.scheduler.finished_at(now(), outcome)
    }

    fn emit(&self, event: RunnerEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use docket_common::types::{DocumentStatus, Item};
    use rust_decimal::Decimal;
    use serde_json::{json, Map};

    use super::*;

    /// Applies saves like the server's lock check: equal token or conflict.
    /// Items whose id is not already stored get a fresh one.
    struct FakeServer {
        latest: Mutex<Document>,
        submitted: Mutex<Vec<DocumentSnapshot>>,
        latency: Duration,
    }

    impl FakeServer {
        fn new(latency: Duration) -> Arc<Self> {
            let stamp = Utc::now();
            let mut attributes = Map::new();
            attributes.insert("billTo".to_string(), json!("Acme"));
            Arc::new(Self {
                latest: Mutex::new(Document {
                    id: Uuid::new_v4(),
                    kind: DocumentKind::Quotation,
                    number: "QT-2025-0001".to_string(),
                    name: "Acme".to_string(),
                    status: DocumentStatus::Draft,
                    created_at: stamp,
                    modified_at: stamp,
                    deleted_at: None,
                    items: Vec::new(),
                    remarks: Vec::new(),
                    signatures: Vec::new(),
                    attributes,
                }),
                submitted: Mutex::new(Vec::new()),
                latency,
            })
        }

        fn latest(&self) -> Document {
            self.latest.lock().unwrap().clone()
        }

        fn submitted(&self) -> Vec<DocumentSnapshot> {
            self.submitted.lock().unwrap().clone()
        }

        /// Another client saves in between.
        fn concurrent_write(&self) {
            let mut latest = self.latest.lock().unwrap();
            latest.modified_at += chrono::Duration::seconds(1);
        }
    }

    impl SaveTransport for FakeServer {
        async fn load(&self, _kind: DocumentKind, _id: Uuid) -> Result<Document, ClientError> {
            Ok(self.latest())
        }

        async fn save(
            &self,
            _kind: DocumentKind,
            _id: Uuid,
            snapshot: DocumentSnapshot,
            cancel: CancellationToken,
        ) -> Result<Document, ClientError> {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }

            self.submitted.lock().unwrap().push(snapshot.clone());
            let mut latest = self.latest.lock().unwrap();
            if snapshot.modified_at.is_some_and(|known| known != latest.modified_at) {
                return Err(ClientError::Conflict {
                    stored: Some(latest.modified_at),
                    message: "stale".to_string(),
                });
            }
            latest.modified_at += chrono::Duration::milliseconds(10);
            latest.attributes.extend(snapshot.scalar_attributes());
            if let Some(items) = &snapshot.items {
                let stored: Vec<Uuid> = latest.items.iter().map(|item| item.id).collect();
                latest.items = items
                    .iter()
                    .zip(0..)
                    .map(|(input, order)| Item {
                        id: input
                            .id
                            .as_deref()
                            .and_then(|id| Uuid::parse_str(id).ok())
                            .filter(|id| stored.contains(id))
                            .unwrap_or_else(Uuid::new_v4),
                        order,
                        product_name: input.product_name.clone(),
                        details: Vec::new(),
                        total: Decimal::ZERO,
                    })
                    .collect();
            }
            Ok(latest.clone())
        }
    }

    struct Harness {
        commands: mpsc::Sender<RunnerCommand>,
        events: mpsc::UnboundedReceiver<RunnerEvent>,
        task: JoinHandle<DocumentSession>,
        shutdown: CancellationToken,
    }

    fn spawn_runner(server: &Arc<FakeServer>) -> Harness {
        let (commands, command_rx) = mpsc::channel(16);
        let (event_tx, events) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let runner = AutoSaveRunner::new(
            Arc::clone(server),
            DocumentSession::open(server.latest()),
            AutoSaveConfig::default(),
            event_tx,
        );
        let task = tokio::spawn(runner.run(command_rx, shutdown.clone()));
        Harness { commands, events, task, shutdown }
    }

    fn edit_items(product_name: &str) -> RunnerCommand {
        let draft = serde_json::from_value(json!({
            "items": [{ "id": "tmp-1", "productName": product_name }]
        }))
        .unwrap();
        RunnerCommand::Edited(draft)
    }

    fn edit(note: &str) -> RunnerCommand {
        let mut draft = DocumentSnapshot::default();
        draft.attributes.insert("note".to_string(), json!(note));
        RunnerCommand::Edited(draft)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_produce_one_debounced_save() {
        let server = FakeServer::new(Duration::from_millis(100));
        let mut harness = spawn_runner(&server);
        let started = Instant::now();

        for note in ["a", "ab", "abc"] {
            harness.commands.send(edit(note)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        let RunnerEvent::Saved { document, trigger, superseded } =
            harness.events.recv().await.unwrap()
        else {
            panic!("expected a save");
        };
        assert_eq!(trigger, SaveTrigger::Auto);
        assert!(!superseded);
        assert_eq!(document.attributes["note"], "abc");
        assert!(started.elapsed() >= Duration::from_millis(3_000));

        let submitted = server.submitted();
        assert_eq!(submitted.len(), 1);

        drop(harness.commands);
        let session = harness.task.await.unwrap();
        assert_eq!(session.known_modified_at(), server.latest().modified_at);
    }

    #[tokio::test(start_paused = true)]
    async fn successive_saves_carry_the_adopted_timestamp() {
        let server = FakeServer::new(Duration::from_millis(10));
        let mut harness = spawn_runner(&server);

        harness.commands.send(edit("one")).await.unwrap();
        harness.commands.send(RunnerCommand::SaveNow).await.unwrap();
        assert!(matches!(harness.events.recv().await, Some(RunnerEvent::Saved { .. })));

        harness.commands.send(edit("two")).await.unwrap();
        harness.commands.send(RunnerCommand::SaveNow).await.unwrap();
        assert!(matches!(harness.events.recv().await, Some(RunnerEvent::Saved { .. })));

        let submitted = server.submitted();
        assert_eq!(submitted.len(), 2);
        assert_ne!(submitted[0].modified_at, submitted[1].modified_at);
        harness.shutdown.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_save_cancels_in_flight_auto_save() {
        let server = FakeServer::new(Duration::from_secs(5));
        let mut harness = spawn_runner(&server);

        harness.commands.send(edit("draft")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        harness.commands.send(RunnerCommand::SaveNow).await.unwrap();

        let RunnerEvent::Saved { trigger, .. } = harness.events.recv().await.unwrap() else {
            panic!("expected a save");
        };
        assert_eq!(trigger, SaveTrigger::Manual);
        assert_eq!(server.submitted().len(), 1);

        harness.shutdown.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_stops_auto_save_until_overwrite() {
        let server = FakeServer::new(Duration::from_millis(10));
        let mut harness = spawn_runner(&server);
        server.concurrent_write();

        harness.commands.send(edit("mine")).await.unwrap();
        let RunnerEvent::Conflict { stored } = harness.events.recv().await.unwrap() else {
            panic!("expected a conflict");
        };
        assert_eq!(stored, Some(server.latest().modified_at));

        harness.commands.send(edit("mine, again")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(server.submitted().len(), 1);

        harness.commands.send(RunnerCommand::Overwrite).await.unwrap();
        let RunnerEvent::Saved { document, .. } = harness.events.recv().await.unwrap() else {
            panic!("expected the overwrite to save");
        };
        assert_eq!(document.attributes["note"], "mine, again");
        assert_eq!(server.submitted().len(), 2);

        harness.shutdown.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reload_after_conflict_adopts_server_document() {
        let server = FakeServer::new(Duration::from_millis(10));
        let mut harness = spawn_runner(&server);
        server.concurrent_write();

        harness.commands.send(edit("mine")).await.unwrap();
        assert!(matches!(harness.events.recv().await, Some(RunnerEvent::Conflict { .. })));

        harness.commands.send(RunnerCommand::Reload).await.unwrap();
        let RunnerEvent::Reloaded(document) = harness.events.recv().await.unwrap() else {
            panic!("expected a reload");
        };
        assert_eq!(document, server.latest());

        drop(harness.commands);
        let session = harness.task.await.unwrap();
        assert_eq!(session.known_modified_at(), server.latest().modified_at);
        assert_eq!(server.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_channel_flushes_unsaved_edits() {
        let server = FakeServer::new(Duration::from_millis(10));
        let mut harness = spawn_runner(&server);

        harness.commands.send(edit("last words")).await.unwrap();
        drop(harness.commands);

        let session = harness.task.await.unwrap();
        assert!(matches!(
            harness.events.recv().await,
            Some(RunnerEvent::Saved { trigger: SaveTrigger::Manual, .. })
        ));
        assert_eq!(session.baseline().attributes["note"], "last words");
    }

    #[tokio::test(start_paused = true)]
    async fn edits_during_a_save_reuse_the_server_ids() {
        let server = FakeServer::new(Duration::from_secs(1));
        let mut harness = spawn_runner(&server);

        harness.commands.send(edit_items("Desk")).await.unwrap();
        harness.commands.send(RunnerCommand::SaveNow).await.unwrap();
        harness.commands.send(edit_items("Desk, oak")).await.unwrap();

        let RunnerEvent::Saved { document, superseded, .. } = harness.events.recv().await.unwrap()
        else {
            panic!("expected a save");
        };
        assert!(superseded);
        let first_id = document.items[0].id;

        harness.commands.send(RunnerCommand::SaveNow).await.unwrap();
        let RunnerEvent::Saved { document, superseded, .. } = harness.events.recv().await.unwrap()
        else {
            panic!("expected a second save");
        };
        assert!(!superseded);
        assert_eq!(document.items.len(), 1);
        assert_eq!(document.items[0].id, first_id);
        assert_eq!(document.items[0].product_name, "Desk, oak");

        let submitted = server.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[1].items.as_ref().unwrap()[0].id, Some(first_id.to_string()));

        harness.shutdown.cancel();
        harness.task.await.unwrap();
    }
}
