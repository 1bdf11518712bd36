//! Contacts screen controller
//!
//! Owns the three independently loaded collections (contacts, leads, call
//! log) plus the call-session tracker. The lifecycle handler is registered
//! at construction. Activation starts all loaders at once on the caller's
//! task; teardown cancels in-flight loads and deregisters the handler. Each
//! loader writes only its own slot, and the lifecycle handler touches only
//! the session history.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::calllog::{correlate, CallLogEntry, CallLogPlatform, CallLogSource};
use crate::clock::Clock;
use crate::config::ScreenConfig;
use crate::contacts::{ContactDirectoryLoader, ContactRecord, ContactsPlatform};
use crate::feed::{select_feed, FeedSources, FeedTab, RenderContract};
use crate::leads::{HttpLeadsApi, LeadRecord, LeadSource, LeadsApi, SessionTokenProvider};
use crate::lifecycle::{LifecycleObserver, Subscription};
use crate::notice::Notice;
use crate::session::{CallSession, CallSessionTracker, DialTarget, Dialer};

/// Collaborators injected at construction
#[derive(Clone)]
pub struct ScreenDeps {
    pub contacts: Arc<dyn ContactsPlatform>,
    pub call_log: Arc<dyn CallLogPlatform>,
    pub leads_api: Arc<dyn LeadsApi>,
    pub tokens: Arc<dyn SessionTokenProvider>,
    pub dialer: Arc<dyn Dialer>,
    pub clock: Arc<dyn Clock>,
}

impl ScreenDeps {
    /// Deps using the reqwest lead client built from `config`.
    pub fn with_http_leads(
        config: &ScreenConfig,
        contacts: Arc<dyn ContactsPlatform>,
        call_log: Arc<dyn CallLogPlatform>,
        tokens: Arc<dyn SessionTokenProvider>,
        dialer: Arc<dyn Dialer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            contacts,
            call_log,
            leads_api: Arc::new(HttpLeadsApi::new(&config.api_base_url, config.request_timeout())),
            tokens,
            dialer,
            clock,
        }
    }
}

#[derive(Default)]
struct ScreenState {
    active_tab: FeedTab,
    entered_number: String,
    loading: bool,
    contacts: Arc<Vec<ContactRecord>>,
    contacts_loaded: bool,
    call_log: Arc<Vec<CallLogEntry>>,
}

/// Live loads for one activation. Dropping it cancels them.
struct Activation {
    cancel: CancellationToken,
}

impl Drop for Activation {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct ContactsScreen {
    config: ScreenConfig,
    contacts_loader: ContactDirectoryLoader,
    call_log_source: CallLogSource,
    leads: LeadSource,
    tracker: Arc<CallSessionTracker>,
    lifecycle: LifecycleObserver,
    state: Mutex<ScreenState>,
    activation: Mutex<Option<Activation>>,
    subscription: Mutex<Option<Subscription>>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl ContactsScreen {
    /// Build the screen; the receiver yields every user-visible notice.
    pub fn new(
        config: ScreenConfig,
        deps: ScreenDeps,
        lifecycle: LifecycleObserver,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        let tracker = CallSessionTracker::with_policy(
            deps.clock,
            deps.dialer,
            config.history_capacity,
            config.open_session_policy,
        );
        let tracker = Arc::new(tracker);
        let subscription = Self::subscribe_tracker(&lifecycle, &tracker);
        let screen = Self {
            contacts_loader: ContactDirectoryLoader::new(deps.contacts),
            call_log_source: CallLogSource::new(deps.call_log),
            leads: LeadSource::new(deps.leads_api, deps.tokens),
            tracker,
            lifecycle,
            state: Mutex::new(ScreenState::default()),
            activation: Mutex::new(None),
            subscription: Mutex::new(Some(subscription)),
            notices,
            config,
        };
        (screen, rx)
    }

    /// Sessions dialed at any point before teardown are closed by the
    /// next background -> active transition.
    fn subscribe_tracker(lifecycle: &LifecycleObserver, tracker: &Arc<CallSessionTracker>) -> Subscription {
        let tracker = Arc::clone(tracker);
        lifecycle.subscribe(move |previous, next| {
            tracker.on_transition(previous, next);
        })
    }

    /// Run all three loaders to completion. Results landing after
    /// `teardown` are dropped.
    pub async fn activate(&self) {
        let cancel = CancellationToken::new();
        {
            let mut subscription = self.subscription.lock();
            if subscription.is_none() {
                *subscription = Some(Self::subscribe_tracker(&self.lifecycle, &self.tracker));
            }
        }
        // Replacing a prior activation cancels its loads.
        *self.activation.lock() = Some(Activation { cancel: cancel.clone() });
        self.state.lock().loading = true;
        info!("Contacts screen activated");

        futures::join!(
            self.load_contacts(&cancel),
            self.load_leads(&cancel),
            self.load_call_log(&cancel),
        );
    }

    /// Cancel in-flight loads and deregister the lifecycle handler.
    pub fn teardown(&self) {
        let cancelled = self.activation.lock().take().is_some();
        let unsubscribed = self.subscription.lock().take().is_some();
        if cancelled || unsubscribed {
            info!("Contacts screen torn down");
        }
    }

    pub fn is_active(&self) -> bool {
        self.activation.lock().is_some()
    }

    async fn load_contacts(&self, cancel: &CancellationToken) {
        let load = self.contacts_loader.load().await;
        if cancel.is_cancelled() {
            debug!("Discarding contacts loaded after teardown");
            return;
        }
        {
            let mut state = self.state.lock();
            state.contacts = Arc::new(load.contacts);
            state.contacts_loaded = true;
            if !state.call_log.is_empty() {
                let mut entries = state.call_log.as_ref().clone();
                correlate(&mut entries, &state.contacts);
                state.call_log = Arc::new(entries);
            }
        }
        self.emit(load.notice);
    }

    async fn load_call_log(&self, cancel: &CancellationToken) {
        let mut load = self.call_log_source.load(self.config.call_log_limit).await;
        if cancel.is_cancelled() {
            debug!("Discarding call log loaded after teardown");
            return;
        }
        {
            let mut state = self.state.lock();
            if state.contacts_loaded {
                correlate(&mut load.entries, &state.contacts);
            }
            state.call_log = Arc::new(load.entries);
        }
        self.emit(load.notice);
    }

    async fn load_leads(&self, cancel: &CancellationToken) {
        let result = self
            .leads
            .fetch_until_cancelled(&self.config.lead_request(), cancel)
            .await;
        if cancel.is_cancelled() {
            return;
        }
        self.state.lock().loading = false;
        if let Err(e) = result {
            self.emit(e.into_notice());
        }
    }

    /// Explicit lead refresh; the only way the lead tab changes after load.
    pub async fn refresh_leads(&self) {
        let cancel = match self.activation.lock().as_ref() {
            Some(a) => a.cancel.clone(),
            None => return,
        };
        self.load_leads(&cancel).await;
    }

    fn emit(&self, notice: Option<Notice>) {
        if let Some(notice) = notice {
            info!(notice = %notice, "Screen notice");
            if self.notices.send(notice).is_err() {
                debug!("Notice receiver dropped");
            }
        }
    }

    pub async fn dial(&self, target: DialTarget) -> Option<CallSession> {
        match self.tracker.dial(target).await {
            Ok(outcome) => {
                if let Some(e) = outcome.dialer_error {
                    self.emit(Some(Notice::DialFailed(e.to_string())));
                }
                Some(outcome.session)
            }
            Err(e) => {
                self.emit(Some(e.into()));
                None
            }
        }
    }

    pub fn set_entered_number(&self, number: impl Into<String>) {
        self.state.lock().entered_number = number.into();
    }

    pub fn entered_number(&self) -> String {
        self.state.lock().entered_number.clone()
    }

    /// Dial whatever is in the number field as an ad hoc call.
    pub async fn dial_entered(&self) -> Option<CallSession> {
        let number = self.entered_number();
        self.dial(DialTarget::ad_hoc(number)).await
    }

    pub fn set_active_tab(&self, tab: FeedTab) {
        self.state.lock().active_tab = tab;
    }

    pub fn active_tab(&self) -> FeedTab {
        self.state.lock().active_tab
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn contacts(&self) -> Arc<Vec<ContactRecord>> {
        Arc::clone(&self.state.lock().contacts)
    }

    pub fn leads(&self) -> Arc<Vec<LeadRecord>> {
        self.leads.leads()
    }

    pub fn call_log(&self) -> Arc<Vec<CallLogEntry>> {
        Arc::clone(&self.state.lock().call_log)
    }

    pub fn history(&self) -> Vec<CallSession> {
        self.tracker.history()
    }

    pub fn lifecycle(&self) -> &LifecycleObserver {
        &self.lifecycle
    }

    /// Rows for the active tab
    pub fn render_feed(&self) -> Vec<RenderContract> {
        let tab = self.active_tab();
        let contacts = self.contacts();
        let leads = self.leads();
        let call_log = self.call_log();
        let sessions = self.history();
        let sources = FeedSources {
            contacts: &contacts,
            leads: &leads,
            sessions: &sessions,
            call_log: &call_log,
        };
        select_feed(tab, &sources).render()
    }
}

impl Drop for ContactsScreen {
    fn drop(&mut self) {
        self.teardown();
    }
}
