mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod source;

pub use availability::{
    blocked_slots, blocked_window, first_conflict, is_available, is_fully_booked, slot_grid,
};
pub use error::EngineError;
pub use source::{BookingSource, DayView, SourceError, day_view, is_slot_available};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::catalogue::{Catalogues, ServiceCatalogue};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is in progress are
/// written together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so partial bytes don't leak into the
    // next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// Booking store for one venue.
///
/// Bookings live per (service, date). A reservation takes that day's write
/// lock, re-checks availability against the day's committed bookings and
/// appends to the WAL before releasing it, so two overlapping requests for
/// the same day can never both commit.
pub struct Engine {
    pub(super) days: DashMap<DayKey, SharedDayState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Booking id → the day holding it.
    pub(super) booking_to_day: DashMap<Ulid, DayKey>,
    /// Mutations hold this shared, taken before any day lock. Compaction
    /// holds it exclusively so no append lands between snapshot and swap.
    pub(super) wal_gate: RwLock<()>,
    catalogues: Arc<Catalogues>,
}

/// Apply an event to its day (caller holds the day's lock).
fn apply_to_day(day: &mut DayState, event: &Event, index: &DashMap<Ulid, DayKey>) {
    match event {
        Event::BookingReserved {
            id,
            service,
            date,
            slot_label,
            tier_or_package,
            label,
            status,
            created_at,
        } => {
            day.insert(BookingRecord {
                id: *id,
                service: *service,
                date: *date,
                slot_label: slot_label.clone(),
                tier_or_package: tier_or_package.clone(),
                label: label.clone(),
                status: *status,
                created_at: *created_at,
            });
            index.insert(*id, day.key);
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(record) = day.get_mut(*id) {
                record.status = *status;
            }
        }
        Event::BookingCancelled { id, .. } => {
            day.remove(*id);
            index.remove(id);
        }
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        catalogues: Arc<Catalogues>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let booking_to_day = DashMap::new();
        let mut replayed: HashMap<DayKey, DayState> = HashMap::new();
        for event in &events {
            let key = event.key();
            let day = replayed.entry(key).or_insert_with(|| DayState::new(key));
            apply_to_day(day, event, &booking_to_day);
        }
        if !events.is_empty() {
            info!(
                path = %wal_path.display(),
                events = events.len(),
                bookings = booking_to_day.len(),
                "replayed WAL"
            );
        }

        let days = replayed
            .into_iter()
            .filter(|(_, day)| !day.bookings.is_empty())
            .map(|(key, day)| (key, Arc::new(RwLock::new(day))))
            .collect();

        Ok(Self {
            days,
            wal_tx,
            notify,
            booking_to_day,
            wal_gate: RwLock::new(()),
            catalogues,
        })
    }

    pub fn catalogue(&self, service: ServiceKind) -> &ServiceCatalogue {
        self.catalogues.get(service)
    }

    pub fn catalogues(&self) -> &Catalogues {
        &self.catalogues
    }

    async fn wal_request<T>(
        &self,
        cmd: WalCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, EngineError> {
        self.wal_tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))
    }

    /// Durably append one event through the group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            event: event.clone(),
            response: tx,
        };
        self.wal_request(cmd, rx)
            .await?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn get_day(&self, key: &DayKey) -> Option<SharedDayState> {
        self.days.get(key).map(|e| e.value().clone())
    }

    fn day_or_default(&self, key: DayKey) -> SharedDayState {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(key))))
            .value()
            .clone()
    }

    /// Write lock on the day currently mapped to `key`, creating it if absent.
    /// Retries when the day was dropped from the map while we waited.
    pub(super) async fn lock_day_write(&self, key: DayKey) -> OwnedRwLockWriteGuard<DayState> {
        loop {
            let day = self.day_or_default(key);
            let guard = day.clone().write_owned().await;
            if self.is_mapped(&key, &day) {
                return guard;
            }
        }
    }

    fn is_mapped(&self, key: &DayKey, day: &SharedDayState) -> bool {
        self.days
            .get(key)
            .is_some_and(|e| Arc::ptr_eq(e.value(), day))
    }

    /// Drop an emptied day from the map. The caller still holds its write
    /// lock, so waiters see it unmapped and retry.
    pub(super) fn forget_if_empty(&self, day: &SharedDayState, guard: &DayState) {
        if guard.bookings.is_empty() {
            self.days.remove_if(&guard.key, |_, mapped| Arc::ptr_eq(mapped, day));
        }
    }

    /// WAL-append, apply, notify.
    pub(super) async fn persist_and_apply(
        &self,
        day: &mut DayState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(day, event, &self.booking_to_day);
        self.notify.send(day.key, event);
        Ok(())
    }

    /// Lookup booking → day and take that day's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        id: Ulid,
    ) -> Result<(SharedDayState, OwnedRwLockWriteGuard<DayState>), EngineError> {
        let key = self
            .booking_to_day
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let day = self.get_day(&key).ok_or(EngineError::NotFound(id))?;
        let guard = day.clone().write_owned().await;
        // Cancelled while we waited for the lock.
        if guard.get(id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        Ok((day, guard))
    }
}
