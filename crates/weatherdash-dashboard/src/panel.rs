//! Panel state and the refresh protocol.
//!
//! A panel holds the selected city, the last weather document and a dirty
//! flag. Anyone may mark a panel dirty; only the render loop clears it, via
//! [`PanelState::begin_fetch`], and issues exactly one fetch per clear.
//!
//! At most one fetch per panel is outstanding. While a fetch for the selected
//! city is running the dirty flag stays set, and the completion publishes a
//! change so the render loop picks the pending refresh up. Selecting another
//! city supersedes the running fetch instead: fetches carry a [`FetchTicket`],
//! only the most recently issued ticket may complete, and a slow response for
//! the old city is dropped so it cannot overwrite the new selection.

use std::fmt;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use weatherdash_weather::CityId;

/// Which of the two panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    /// Fetches straight from the weather API.
    Client,
    /// Fetches through the server-side proxy.
    Server,
}

impl PanelKind {
    pub const ALL: [PanelKind; 2] = [PanelKind::Client, PanelKind::Server];

    pub fn label(&self) -> &'static str {
        match self {
            PanelKind::Client => "client",
            PanelKind::Server => "server",
        }
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Handle for one issued fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    panel: PanelKind,
    request: u64,
    city: CityId,
}

impl FetchTicket {
    pub fn panel(&self) -> PanelKind {
        self.panel
    }

    pub fn request(&self) -> u64 {
        self.request
    }

    pub fn city(&self) -> &CityId {
        &self.city
    }
}

/// Point-in-time copy of a panel for display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PanelSnapshot {
    pub selected_id: Option<CityId>,
    pub data: Option<Value>,
    pub dirty: bool,
    pub loading: bool,
    /// Raw error from the last failed fetch
    pub error: Option<String>,
}

impl PanelSnapshot {
    /// Data is on screen but the latest refresh failed.
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }
}

#[derive(Debug)]
struct InFlight {
    request: u64,
    city: CityId,
}

#[derive(Debug, Default)]
struct PanelInner {
    selected_id: Option<CityId>,
    data: Option<Value>,
    dirty: bool,
    error: Option<String>,
    in_flight: Option<InFlight>,
    last_request: u64,
}

#[derive(Debug)]
pub struct PanelState {
    kind: PanelKind,
    inner: Mutex<PanelInner>,
    revision: watch::Sender<u64>,
}

impl PanelState {
    pub fn new(kind: PanelKind) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            kind,
            inner: Mutex::new(PanelInner::default()),
            revision,
        }
    }

    pub fn kind(&self) -> PanelKind {
        self.kind
    }

    /// Receiver that wakes on every change to this panel.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn publish(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    /// Request a refresh. Idempotent.
    pub fn mark_dirty(&self) {
        let newly_dirty = {
            let mut inner = self.inner.lock();
            !std::mem::replace(&mut inner.dirty, true)
        };
        if newly_dirty {
            tracing::debug!("{} panel marked dirty", self.kind);
            self.publish();
        }
    }

    /// Read and clear the dirty flag in one step.
    pub fn consume_if_dirty(&self) -> bool {
        std::mem::replace(&mut self.inner.lock().dirty, false)
    }

    /// Change the selected city. Does not mark the panel dirty.
    pub fn set_selected_id(&self, id: CityId) {
        self.inner.lock().selected_id = Some(id);
        self.publish();
    }

    /// Consume the dirty flag and, if a city is selected, issue a ticket for
    /// one fetch. Returns `None` when the panel was clean or has no selection.
    ///
    /// If a fetch for the selected city is still running, the flag is left
    /// set and no ticket is issued; the refresh happens once that fetch
    /// completes.
    pub fn begin_fetch(&self) -> Option<FetchTicket> {
        let ticket = {
            let mut inner = self.inner.lock();
            if !inner.dirty {
                return None;
            }
            let Some(city) = inner.selected_id.clone() else {
                inner.dirty = false;
                tracing::debug!("{} panel refreshed with no city selected", self.kind);
                return None;
            };
            if let Some(running) = inner.in_flight.as_ref().filter(|f| f.city == city) {
                tracing::trace!(
                    "{} panel refresh deferred until fetch #{} completes",
                    self.kind,
                    running.request
                );
                return None;
            }
            inner.dirty = false;
            inner.last_request += 1;
            inner.in_flight = Some(InFlight {
                request: inner.last_request,
                city: city.clone(),
            });
            FetchTicket {
                panel: self.kind,
                request: inner.last_request,
                city,
            }
        };

        tracing::debug!(
            "{} panel fetch #{} for city {}",
            self.kind,
            ticket.request,
            ticket.city
        );
        self.publish();
        Some(ticket)
    }

    /// Store the outcome of the fetch behind `ticket`.
    ///
    /// On success the data is replaced and any previous error cleared; on
    /// failure the data is kept and the error recorded. Returns `false` and
    /// changes nothing when `ticket` is not the latest issued one.
    pub fn complete_fetch<E: fmt::Display>(
        &self,
        ticket: FetchTicket,
        result: Result<Value, E>,
    ) -> bool {
        {
            let mut inner = self.inner.lock();
            let current = inner.in_flight.as_ref().map(|f| f.request);
            if ticket.panel != self.kind || current != Some(ticket.request) {
                tracing::debug!(
                    "{} panel dropped stale response #{} (latest #{})",
                    self.kind,
                    ticket.request,
                    inner.last_request
                );
                return false;
            }
            inner.in_flight = None;
            match result {
                Ok(value) => {
                    inner.data = Some(value);
                    inner.error = None;
                }
                Err(e) => {
                    inner.error = Some(e.to_string());
                }
            }
        }
        self.publish();
        true
    }

    pub fn selected_id(&self) -> Option<CityId> {
        self.inner.lock().selected_id.clone()
    }

    pub fn data(&self) -> Option<Value> {
        self.inner.lock().data.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let inner = self.inner.lock();
        PanelSnapshot {
            selected_id: inner.selected_id.clone(),
            data: inner.data.clone(),
            dirty: inner.dirty,
            loading: inner.in_flight.is_some(),
            error: inner.error.clone(),
        }
    }
}
