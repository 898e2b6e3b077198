// ── Monitor ──
//
// Lifecycle owner for every printer session. Owns the store, the
// database, one link session per printer and the persistence writer.
// All consumer operations go through here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use printpulse_api::{ConnectionConfig, LinkEvent, LinkHandle, MqttLink, RequestSender};
use tokio::sync::{Mutex, Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::{Backend, MonitorConfig};
use crate::database::Database;
use crate::error::CoreError;
use crate::model::{ConnectionState, Printer, PrinterConfig, PrinterEvent, PrinterStatus};
use crate::simulator::Simulator;
use crate::store::PrinterStore;
use crate::stream::PrinterStream;
use crate::telemetry::apply_report;

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Monitor ──────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<MonitorInner>`. Construct with
/// [`new`](Self::new), then [`start`](Self::start) to open the database,
/// restore registered printers and spawn their sessions.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    store: Arc<PrinterStore>,
    event_tx: broadcast::Sender<PrinterEvent>,
    sessions: DashMap<String, Session>,
    database: OnceLock<Arc<Database>>,
    /// Ids whose latest record has not been written yet.
    dirty: Arc<DashSet<String>>,
    persist_wake: Arc<Notify>,
    /// Serializes add/remove so duplicate checks hold.
    registration: Mutex<()>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

/// A running link session for one printer.
struct Session {
    requests: RequestSender,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Monitor {
    /// Create a monitor. Does NOT start anything; call
    /// [`start()`](Self::start).
    pub fn new(config: MonitorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(MonitorInner {
                config,
                store: Arc::new(PrinterStore::new()),
                event_tx,
                sessions: DashMap::new(),
                database: OnceLock::new(),
                dirty: Arc::new(DashSet::new()),
                persist_wake: Arc::new(Notify::new()),
                registration: Mutex::new(()),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<PrinterStore> {
        &self.inner.store
    }

    /// The open database, once started.
    pub fn database(&self) -> Option<Arc<Database>> {
        self.inner.database.get().cloned()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the database, restore printers and spawn every session.
    ///
    /// Restored printers show their last-known telemetry with status
    /// Offline until their link reports. Calling this twice is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        for config in &self.inner.config.printers {
            config.validate()?;
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let path = self.inner.config.database.clone();
        let db = Arc::new(
            run_blocking(move || match path {
                Some(path) => Database::open(&path),
                None => Database::open_in_memory(),
            })
            .await?,
        );
        let _ = self.inner.database.set(Arc::clone(&db));

        // Configured printers refresh their persisted registrations.
        let configured = self.inner.config.printers.clone();
        let restore_db = Arc::clone(&db);
        let (registered, states) = run_blocking(move || {
            for config in &configured {
                restore_db.upsert_printer(config)?;
            }
            Ok((restore_db.list_printers()?, restore_db.load_states()?))
        })
        .await?;

        let mut states: HashMap<_, _> = states
            .into_iter()
            .map(|state| (state.printer_id.clone(), state))
            .collect();

        for config in &registered {
            let mut record = Printer::from_config(config);
            match states.remove(&config.id) {
                Some(state) => state.apply_to(&mut record),
                None => record.status = PrinterStatus::Offline,
            }
            self.publish(record);
        }

        let handle = tokio::spawn(persistence_task(
            Arc::clone(&db),
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.dirty),
            Arc::clone(&self.inner.persist_wake),
            self.inner.cancel.clone(),
        ));
        self.inner.task_handles.lock().await.push(handle);

        for config in &registered {
            if let Err(e) = self.spawn_session(config) {
                warn!(printer = %config.id, error = %e, "cannot start printer session");
            }
        }

        info!(
            printers = registered.len(),
            simulated = self.inner.config.is_simulated(),
            "monitor started"
        );
        Ok(())
    }

    /// Stop every session and background task.
    ///
    /// The latest record of every printer changed since its last write is
    /// flushed before this returns.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let ids: Vec<String> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            if let Some((_, session)) = self.inner.sessions.remove(&id) {
                let _ = session.task.await;
            }
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        // Sessions may have marked records after the writer's last pass
        if let Some(db) = self.database() {
            flush(&db, &self.inner.store, &self.inner.dirty).await;
        }
        debug!("monitor shut down");
    }

    /// One-shot: start, run closure, shut down.
    pub async fn oneshot<F, Fut, T>(config: MonitorConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Monitor) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let monitor = Monitor::new(config);
        monitor.start().await?;
        let result = f(monitor.clone()).await;
        monitor.shutdown().await;
        result
    }

    /// Wait until no printer is still establishing its first session.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_until_settled(&self, timeout: Duration) -> bool {
        let mut stream = self.inner.store.subscribe();
        let settled = |printers: &[Arc<Printer>]| {
            printers
                .iter()
                .all(|p| p.connection_state != ConnectionState::Connecting)
        };

        tokio::time::timeout(timeout, async move {
            if settled(&stream.latest()) {
                return;
            }
            while let Some(snapshot) = stream.changed().await {
                if settled(&snapshot) {
                    return;
                }
            }
        })
        .await
        .is_ok()
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register a printer and start its session.
    pub async fn add_printer(&self, config: PrinterConfig) -> Result<(), CoreError> {
        let _guard = self.inner.registration.lock().await;
        self.check_new(&config)?;

        let cancel = self.inner.cancel.child_token();
        let link = self.open_link(&config, cancel.clone())?;
        if let Err(e) = self.register(&config).await {
            cancel.cancel();
            return Err(e);
        }
        self.attach(&config.id, link, cancel);
        Ok(())
    }

    /// Register a printer driven by an externally supplied link.
    pub async fn add_printer_with_link(
        &self,
        config: PrinterConfig,
        link: LinkHandle,
    ) -> Result<(), CoreError> {
        let _guard = self.inner.registration.lock().await;
        self.check_new(&config)?;
        self.register(&config).await?;
        self.attach(&config.id, link, self.inner.cancel.child_token());
        Ok(())
    }

    /// Unregister a printer: stop its session, drop its state and rows.
    pub async fn remove_printer(&self, id: &str) -> Result<(), CoreError> {
        let _guard = self.inner.registration.lock().await;
        if !self.inner.store.contains(id) {
            return Err(CoreError::PrinterNotFound { id: id.to_owned() });
        }

        if let Some((_, session)) = self.inner.sessions.remove(id) {
            session.cancel.cancel();
            let _ = session.task.await;
        }

        self.inner.store.remove(id);
        self.inner.dirty.remove(id);

        if let Some(db) = self.database() {
            let owned = id.to_owned();
            run_blocking(move || db.delete_printer(&owned)).await?;
        }

        let _ = self.inner.event_tx.send(PrinterEvent::Removed { id: id.to_owned() });
        info!(printer = %id, "printer removed");
        Ok(())
    }

    fn check_new(&self, config: &PrinterConfig) -> Result<(), CoreError> {
        config.validate()?;
        if self.inner.store.contains(&config.id) {
            return Err(CoreError::AlreadyExists {
                id: config.id.clone(),
            });
        }
        Ok(())
    }

    /// Persist the registration and publish the initial record.
    async fn register(&self, config: &PrinterConfig) -> Result<(), CoreError> {
        if let Some(db) = self.database() {
            let owned = config.clone();
            run_blocking(move || db.upsert_printer(&owned)).await?;
        }
        self.publish(Printer::from_config(config));
        info!(printer = %config.id, ip = %config.ip, "printer registered");
        Ok(())
    }

    fn publish(&self, record: Printer) {
        let record = self.inner.store.upsert(record);
        let _ = self.inner.event_tx.send(PrinterEvent::Updated(record));
    }

    // ── Sessions ─────────────────────────────────────────────────────

    fn spawn_session(&self, config: &PrinterConfig) -> Result<(), CoreError> {
        let cancel = self.inner.cancel.child_token();
        let link = self.open_link(config, cancel.clone())?;
        self.attach(&config.id, link, cancel);
        Ok(())
    }

    fn open_link(
        &self,
        config: &PrinterConfig,
        cancel: CancellationToken,
    ) -> Result<LinkHandle, CoreError> {
        let settings = &self.inner.config;
        match &settings.backend {
            Backend::Mqtt => {
                let mut connection =
                    ConnectionConfig::new(&config.ip, &config.serial, config.access_code.clone());
                connection.tls = settings.tls.clone();
                connection.keep_alive = settings.keep_alive;
                connection.reconnect = settings.reconnect.clone();
                connection.client_id_prefix.clone_from(&settings.client_id_prefix);
                Ok(MqttLink::spawn(connection, cancel)?)
            }
            Backend::Simulated(sim) => Ok(Simulator::spawn(config, sim, cancel)),
        }
    }

    fn attach(&self, id: &str, link: LinkHandle, cancel: CancellationToken) {
        let LinkHandle { events, requests } = link;
        let context = SessionContext {
            id: id.to_owned(),
            store: Arc::clone(&self.inner.store),
            event_tx: self.inner.event_tx.clone(),
            dirty: Arc::clone(&self.inner.dirty),
            persist_wake: Arc::clone(&self.inner.persist_wake),
        };
        let task = tokio::spawn(session_task(context, events, cancel.clone()));

        if let Some(previous) = self.inner.sessions.insert(
            id.to_owned(),
            Session {
                requests,
                cancel,
                task,
            },
        ) {
            previous.cancel.cancel();
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Validate a command against the current record and send it.
    pub async fn execute(&self, id: &str, command: Command) -> Result<(), CoreError> {
        let printer = self
            .inner
            .store
            .get(id)
            .ok_or_else(|| CoreError::PrinterNotFound { id: id.to_owned() })?;
        command.validate(&printer)?;

        let requests = self
            .inner
            .sessions
            .get(id)
            .map(|session| session.requests.clone())
            .ok_or_else(|| CoreError::PrinterOffline { id: id.to_owned() })?;

        info!(printer = %id, command = command.name(), "sending command");
        requests
            .send(command.to_request())
            .await
            .map_err(|e| match e {
                printpulse_api::Error::NotConnected | printpulse_api::Error::ChannelClosed => {
                    CoreError::PrinterOffline { id: id.to_owned() }
                }
                other => other.into(),
            })
    }

    pub async fn pause(&self, id: &str) -> Result<(), CoreError> {
        self.execute(id, Command::Pause).await
    }

    pub async fn resume(&self, id: &str) -> Result<(), CoreError> {
        self.execute(id, Command::Resume).await
    }

    pub async fn stop(&self, id: &str) -> Result<(), CoreError> {
        self.execute(id, Command::Stop).await
    }

    pub async fn request_status(&self, id: &str) -> Result<(), CoreError> {
        self.execute(id, Command::RequestStatus).await
    }

    // ── State observation ────────────────────────────────────────────

    pub fn printers(&self) -> Arc<Vec<Arc<Printer>>> {
        self.inner.store.snapshot()
    }

    pub fn printer(&self, id: &str) -> Option<Arc<Printer>> {
        self.inner.store.get(id)
    }

    pub fn printers_stream(&self) -> PrinterStream {
        self.inner.store.subscribe()
    }

    /// Subscribe to the change broadcast.
    pub fn events(&self) -> broadcast::Receiver<PrinterEvent> {
        self.inner.event_tx.subscribe()
    }
}

// ── Session task ─────────────────────────────────────────────────────

/// What a session needs from the monitor, without holding the monitor.
struct SessionContext {
    id: String,
    store: Arc<PrinterStore>,
    event_tx: broadcast::Sender<PrinterEvent>,
    dirty: Arc<DashSet<String>>,
    persist_wake: Arc<Notify>,
}

impl SessionContext {
    /// Apply `mutate` to the current record and publish the result.
    /// Returns `false` once the printer has been removed.
    fn update(&self, mutate: impl FnOnce(&mut Printer)) -> bool {
        let Some(current) = self.store.get(&self.id) else {
            return false;
        };
        let mut record = (*current).clone();
        mutate(&mut record);

        let record = self.store.upsert(record);
        let _ = self.event_tx.send(PrinterEvent::Updated(record));
        // Bursts coalesce into one write of whatever is latest at write time.
        self.dirty.insert(self.id.clone());
        self.persist_wake.notify_one();
        true
    }
}

async fn session_task(
    context: SessionContext,
    mut events: mpsc::Receiver<LinkEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        let keep_going = match event {
            Some(LinkEvent::Connected) => {
                info!(printer = %context.id, "printer connected");
                context.update(Printer::mark_connected)
            }
            Some(LinkEvent::Report(document)) => {
                let merged = context.store.merge_report(&context.id, document);
                context.update(|record| {
                    if !record.online {
                        record.mark_connected();
                    }
                    apply_report(record, &merged);
                })
            }
            Some(LinkEvent::Disconnected { reason }) => {
                warn!(printer = %context.id, %reason, "printer disconnected");
                context.update(Printer::mark_offline)
            }
            Some(LinkEvent::GaveUp { attempts }) => {
                warn!(printer = %context.id, attempts, "giving up on printer");
                context.update(Printer::mark_offline);
                false
            }
            None => {
                debug!(printer = %context.id, "link closed");
                context.update(Printer::mark_offline);
                false
            }
        };

        if !keep_going {
            break;
        }
    }

    debug!(printer = %context.id, "session ended");
}

// ── Persistence task ─────────────────────────────────────────────────

async fn persistence_task(
    db: Arc<Database>,
    store: Arc<PrinterStore>,
    dirty: Arc<DashSet<String>>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = wake.notified() => flush(&db, &store, &dirty).await,
        }
    }
    flush(&db, &store, &dirty).await;
}

/// Write the current record of every dirty printer.
async fn flush(db: &Arc<Database>, store: &PrinterStore, dirty: &DashSet<String>) {
    let ids: Vec<String> = dirty.iter().map(|id| id.key().clone()).collect();
    for id in ids {
        // Unmark before reading so a concurrent update marks it again.
        if dirty.remove(&id).is_none() {
            continue;
        }
        // Removed printers have no registration row left to hang state on.
        let Some(record) = store.get(&id) else {
            continue;
        };
        let db = Arc::clone(db);
        if let Err(e) = run_blocking(move || db.save_state(&record)).await {
            warn!(printer = %id, error = %e, "failed to persist printer state");
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, CoreError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Internal(format!("database task failed: {e}")))?
}
