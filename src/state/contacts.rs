use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::data::{ContactRecord, LoadState};
use crate::remote::ContactSource;

/// Message published when a fetch succeeds but returns nothing
pub const NO_CONTACTS_MESSAGE: &str = "No contacts found.";

/// State shared between the controller and its background fetch
struct Shared {
    source: Arc<dyn ContactSource>,
    contacts: watch::Sender<Vec<ContactRecord>>,
    error: watch::Sender<Option<String>>,
    state: watch::Sender<LoadState>,
    /// Bumped for every new fetch. Held while publishing, so only the
    /// newest fetch can write results.
    generation: Mutex<u64>,
}

impl Shared {
    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        match self.generation.lock() {
            Ok(generation) => generation,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Keep whatever fetch is running from publishing
    fn invalidate(&self) {
        *self.lock_generation() += 1;
    }

    async fn fetch(&self, generation: u64) {
        let result = self.source.fetch_all().await;

        // An aborted task can still be mid-poll on another worker
        let current = self.lock_generation();
        if *current != generation {
            debug!("Dropping result of superseded contact fetch #{}", generation);
            return;
        }

        // Values go out before the state so a settled state never
        // observes a stale list
        match result {
            Ok(records) if !records.is_empty() => {
                info!("📇 Loaded {} contacts", records.len());
                self.contacts.send_replace(records);
                self.error.send_replace(None);
                self.state.send_replace(LoadState::Loaded);
            }
            Ok(_) => {
                warn!("Contact endpoint returned an empty list");
                self.contacts.send_replace(Vec::new());
                self.error.send_replace(Some(NO_CONTACTS_MESSAGE.to_string()));
                self.state.send_replace(LoadState::ErrorEmpty);
            }
            Err(err) => {
                error!("Failed to load contacts: {}", err);
                self.contacts.send_replace(Vec::new());
                self.error
                    .send_replace(Some(format!("Failed to load contacts: {}", err)));
                self.state.send_replace(LoadState::ErrorEmpty);
            }
        }
    }
}

/// Loads the contact list in the background and publishes the result.
///
/// Contacts, the last error message and the load state are exposed as
/// `watch` channels: a new subscriber immediately sees the current value.
/// The controller owns its fetch task; `reload`, `shutdown` and drop
/// cancel whatever is in flight.
pub struct ContactListController {
    shared: Arc<Shared>,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ContactListController {
    /// `runtime` is where fetches are spawned
    pub fn new(source: Arc<dyn ContactSource>, runtime: Handle) -> Self {
        let (contacts, _) = watch::channel(Vec::new());
        let (error, _) = watch::channel(None);
        let (state, _) = watch::channel(LoadState::Empty);
        Self {
            shared: Arc::new(Shared {
                source,
                contacts,
                error,
                state,
                generation: Mutex::new(0),
            }),
            runtime,
            task: Mutex::new(None),
        }
    }

    /// Start the first fetch.
    ///
    /// Safe to call on every render: once a fetch is in flight or has
    /// finished this is a no-op. Use `reload` to fetch again. Returns
    /// true when a fetch was started.
    pub fn load(&self) -> bool {
        let mut task = match self.task.lock() {
            Ok(task) => task,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *self.shared.state.borrow() != LoadState::Empty {
            return false;
        }
        self.start(&mut task);
        true
    }

    /// Cancel any fetch in flight and start a new one
    pub fn reload(&self) {
        let mut task = match self.task.lock() {
            Ok(task) => task,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = task.take() {
            handle.abort();
        }
        self.start(&mut task);
    }

    fn start(&self, task: &mut Option<JoinHandle<()>>) {
        let generation = {
            let mut current = self.shared.lock_generation();
            *current += 1;
            self.shared.state.send_replace(LoadState::Loading);
            *current
        };
        let shared = Arc::clone(&self.shared);
        *task = Some(self.runtime.spawn(async move { shared.fetch(generation).await }));
    }

    /// Cancel the fetch in flight, if any, and wait for it to stop.
    ///
    /// An interrupted first load leaves the state `Empty` again so a
    /// later `load` can retry.
    pub async fn shutdown(&self) {
        let handle = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        self.shared.invalidate();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.shared.state.send_if_modified(|state| {
            if *state == LoadState::Loading {
                *state = LoadState::Empty;
                true
            } else {
                false
            }
        });
    }

    pub fn state(&self) -> LoadState {
        *self.shared.state.borrow()
    }

    /// Current contact list (empty unless `Loaded`)
    pub fn contacts(&self) -> Vec<ContactRecord> {
        self.shared.contacts.borrow().clone()
    }

    /// Last error message, cleared by a successful fetch
    pub fn error(&self) -> Option<String> {
        self.shared.error.borrow().clone()
    }

    pub fn subscribe_contacts(&self) -> watch::Receiver<Vec<ContactRecord>> {
        self.shared.contacts.subscribe()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.shared.error.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoadState> {
        self.shared.state.subscribe()
    }

    /// Resolves with the state once the current fetch has finished.
    ///
    /// The returned future doesn't borrow the controller, so it can be
    /// handed to any executor.
    pub fn wait_settled(&self) -> impl Future<Output = LoadState> + Send + 'static {
        let mut state = self.subscribe_state();
        async move {
            let settled = state.wait_for(LoadState::is_settled).await.map(|s| *s);
            settled.unwrap_or_else(|_| *state.borrow())
        }
    }
}

impl Drop for ContactListController {
    fn drop(&mut self) {
        let task = match self.task.get_mut() {
            Ok(task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = task {
            handle.abort();
        }
    }
}
