mod capacity;
mod error;
mod mutations;
mod queries;

pub use capacity::{
    allocated_at, available_capacity, check_capacity, current_workload, now_ms,
    overlapping_allocations,
};
pub use error::EngineError;
pub use mutations::AssignmentChange;
pub use queries::AssignmentFilter;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::journal::Journal;
use crate::model::*;
use crate::notify::ChangeFeed;

pub type SharedEngineerState = Arc<RwLock<EngineerState>>;
pub type SharedProject = Arc<RwLock<Project>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
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

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the current batch first, then handle the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(
    journal: &mut Journal,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    journal: &mut Journal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The staffing engine: engineers with their assignments, projects, and the
/// journal that makes every committed mutation durable.
///
/// Each engineer lives behind its own `RwLock`; assignment writes hold the
/// write lock across validate → journal append → apply, which serializes
/// capacity checks per engineer and closes the check-then-act race.
pub struct Engine {
    pub engineers: DashMap<Ulid, SharedEngineerState>,
    pub projects: DashMap<Ulid, SharedProject>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub feed: Arc<ChangeFeed>,
    /// Reverse lookup: assignment id → engineer id.
    pub(super) assignment_to_engineer: DashMap<Ulid, Ulid>,
    /// Project id → assignment ids, for team-size queries.
    pub(super) project_assignments: DashMap<Ulid, Vec<Ulid>>,
}

/// Apply an event directly to an EngineerState (no locking, caller holds the lock).
fn apply_to_engineer(
    es: &mut EngineerState,
    event: &Event,
    assignment_index: &DashMap<Ulid, Ulid>,
    project_index: &DashMap<Ulid, Vec<Ulid>>,
) {
    match event {
        Event::AssignmentCreated {
            id,
            engineer_id,
            project_id,
            allocation,
            window,
            role,
        } => {
            es.insert_assignment(Assignment {
                id: *id,
                project_id: *project_id,
                allocation: *allocation,
                window: *window,
                role: role.clone(),
            });
            assignment_index.insert(*id, *engineer_id);
            project_index.entry(*project_id).or_default().push(*id);
        }
        Event::AssignmentUpdated {
            id,
            allocation,
            window,
            role,
            ..
        } => {
            if let Some(old) = es.remove_assignment(*id) {
                es.insert_assignment(Assignment {
                    id: *id,
                    project_id: old.project_id,
                    allocation: *allocation,
                    window: *window,
                    role: role.clone(),
                });
            }
        }
        Event::AssignmentDeleted { id, .. } => {
            if let Some(old) = es.remove_assignment(*id) {
                assignment_index.remove(id);
                if let Some(mut ids) = project_index.get_mut(&old.project_id) {
                    ids.retain(|a| a != id);
                }
            }
        }
        Event::EngineerUpdated {
            name, max_capacity, ..
        } => {
            es.name = name.clone();
            es.max_capacity = *max_capacity;
        }
        // Engineer add/remove and project events are handled at the map level
        _ => {}
    }
}

impl Engine {
    pub fn new(journal_path: PathBuf, feed: Arc<ChangeFeed>) -> std::io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            engineers: DashMap::new(),
            projects: DashMap::new(),
            journal_tx,
            feed,
            assignment_to_engineer: DashMap::new(),
            project_assignments: DashMap::new(),
        };

        // Replay: we are the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here because this may
        // run inside an async context.
        for event in &events {
            match event {
                Event::EngineerAdded {
                    id,
                    name,
                    max_capacity,
                } => {
                    let es = EngineerState::new(*id, name.clone(), *max_capacity);
                    engine.engineers.insert(*id, Arc::new(RwLock::new(es)));
                }
                Event::EngineerRemoved { id } => {
                    engine.engineers.remove(id);
                }
                Event::ProjectAdded {
                    id,
                    name,
                    team_size,
                    window,
                    status,
                } => {
                    engine.projects.insert(
                        *id,
                        Arc::new(RwLock::new(Project {
                            id: *id,
                            name: name.clone(),
                            team_size: *team_size,
                            window: *window,
                            status: *status,
                        })),
                    );
                }
                Event::ProjectStatusChanged { id, status } => {
                    if let Some(entry) = engine.projects.get(id) {
                        entry
                            .value()
                            .try_write()
                            .expect("replay: uncontended write")
                            .status = *status;
                    }
                }
                Event::ProjectRemoved { id } => {
                    engine.projects.remove(id);
                }
                other => {
                    if let Some(engineer_id) = event_engineer_id(other)
                        && let Some(entry) = engine.engineers.get(&engineer_id)
                    {
                        let es_arc = entry.clone();
                        let mut guard = es_arc.try_write().expect("replay: uncontended write");
                        apply_to_engineer(
                            &mut guard,
                            other,
                            &engine.assignment_to_engineer,
                            &engine.project_assignments,
                        );
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write an event to the journal via the background group-commit writer.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub fn get_engineer(&self, id: &Ulid) -> Option<SharedEngineerState> {
        self.engineers.get(id).map(|e| e.value().clone())
    }

    pub fn get_project(&self, id: &Ulid) -> Option<SharedProject> {
        self.projects.get(id).map(|e| e.value().clone())
    }

    pub fn engineer_for_assignment(&self, assignment_id: &Ulid) -> Option<Ulid> {
        self.assignment_to_engineer
            .get(assignment_id)
            .map(|e| *e.value())
    }

    /// Journal-append + apply + publish in one call, while the caller holds
    /// the engineer's write lock. A journal failure aborts before apply, so
    /// no partial effect leaks into memory.
    pub(super) async fn persist_and_apply(
        &self,
        engineer_id: Ulid,
        es: &mut EngineerState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        apply_to_engineer(
            es,
            event,
            &self.assignment_to_engineer,
            &self.project_assignments,
        );
        self.feed.publish(engineer_id, event);
        Ok(())
    }

    /// Lookup assignment → engineer, get the engineer, acquire the write lock.
    pub(super) async fn resolve_assignment_write(
        &self,
        assignment_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<EngineerState>), EngineError> {
        let engineer_id = self
            .engineer_for_assignment(assignment_id)
            .ok_or(EngineError::AssignmentNotFound(*assignment_id))?;
        let es = self
            .get_engineer(&engineer_id)
            .ok_or(EngineError::EngineerNotFound(engineer_id))?;
        let guard = es.write_owned().await;
        Ok((engineer_id, guard))
    }

    /// Compact the journal by rewriting it with only the events needed to
    /// recreate the current state: engineers, then projects, then assignments.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let mut assignment_events = Vec::new();

        // Compaction runs concurrently with writes, so it waits its turn on
        // each lock. Snapshot the Arcs first; no shard lock across an await.
        let engineers: Vec<SharedEngineerState> =
            self.engineers.iter().map(|e| e.value().clone()).collect();
        for es in engineers {
            let guard = es.read().await;
            events.push(Event::EngineerAdded {
                id: guard.id,
                name: guard.name.clone(),
                max_capacity: guard.max_capacity,
            });
            for a in &guard.assignments {
                assignment_events.push(Event::AssignmentCreated {
                    id: a.id,
                    engineer_id: guard.id,
                    project_id: a.project_id,
                    allocation: a.allocation,
                    window: a.window,
                    role: a.role.clone(),
                });
            }
        }

        let projects: Vec<SharedProject> =
            self.projects.iter().map(|e| e.value().clone()).collect();
        for p in projects {
            let guard = p.read().await;
            events.push(Event::ProjectAdded {
                id: guard.id,
                name: guard.name.clone(),
                team_size: guard.team_size,
                window: guard.window,
                status: guard.status,
            });
        }

        events.extend(assignment_events);

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the engineer id from an engineer-scoped event.
fn event_engineer_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::AssignmentCreated { engineer_id, .. }
        | Event::AssignmentUpdated { engineer_id, .. }
        | Event::AssignmentDeleted { engineer_id, .. } => Some(*engineer_id),
        Event::EngineerUpdated { id, .. } => Some(*id),
        _ => None,
    }
}
