use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::capacity::{check_capacity, validate_window};
use super::{Engine, EngineError};

fn count_mutation(op: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(observability::MUTATIONS_TOTAL, "op" => op, "status" => status)
        .increment(1);
}

impl Engine {
    // ── Engineers ────────────────────────────────────────────

    pub async fn create_engineer(
        &self,
        id: Ulid,
        name: String,
        max_capacity: u32,
    ) -> Result<(), EngineError> {
        if self.engineers.len() >= MAX_ENGINEERS {
            return Err(EngineError::LimitExceeded("too many engineers"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("engineer name too long"));
        }
        if max_capacity > MAX_CAPACITY_PERCENT {
            return Err(EngineError::LimitExceeded("max capacity above 100 percent"));
        }
        if self.engineers.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::EngineerAdded {
            id,
            name: name.clone(),
            max_capacity,
        };
        self.journal_append(&event).await?;
        let es = EngineerState::new(id, name, max_capacity);
        self.engineers.insert(id, Arc::new(RwLock::new(es)));
        metrics::gauge!(observability::ENGINEERS_ACTIVE).set(self.engineers.len() as f64);
        self.feed.publish(id, &event);
        Ok(())
    }

    /// Update an engineer's name and capacity ceiling. Existing assignments
    /// are NOT revalidated; the invariant is only re-checked on assignment
    /// writes, so lowering capacity under load leaves the overload in place
    /// until the next assignment mutation surfaces it.
    pub async fn update_engineer(
        &self,
        id: Ulid,
        name: String,
        max_capacity: u32,
    ) -> Result<(), EngineError> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("engineer name too long"));
        }
        if max_capacity > MAX_CAPACITY_PERCENT {
            return Err(EngineError::LimitExceeded("max capacity above 100 percent"));
        }
        let es = self
            .get_engineer(&id)
            .ok_or(EngineError::EngineerNotFound(id))?;
        let mut guard = es.write().await;
        if !self.engineers.contains_key(&id) {
            // Deleted between lookup and lock acquisition.
            return Err(EngineError::EngineerNotFound(id));
        }

        let event = Event::EngineerUpdated {
            id,
            name,
            max_capacity,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn delete_engineer(&self, id: Ulid) -> Result<(), EngineError> {
        let es = self
            .get_engineer(&id)
            .ok_or(EngineError::EngineerNotFound(id))?;
        // Write lock held across the emptiness check, journal append, and
        // map removal, the same discipline assignment writes use. A racing
        // assignment creation either commits first (and we refuse below) or
        // serializes behind us and fails its own map re-check.
        let guard = es.write().await;
        if !self.engineers.contains_key(&id) {
            return Err(EngineError::EngineerNotFound(id));
        }
        if !guard.assignments.is_empty() {
            return Err(EngineError::HasAssignments(id));
        }

        let event = Event::EngineerRemoved { id };
        self.journal_append(&event).await?;
        self.engineers.remove(&id);
        drop(guard);
        metrics::gauge!(observability::ENGINEERS_ACTIVE).set(self.engineers.len() as f64);
        self.feed.publish(id, &event);
        self.feed.remove(&id);
        Ok(())
    }

    // ── Projects ─────────────────────────────────────────────

    pub async fn create_project(
        &self,
        id: Ulid,
        name: String,
        team_size: u32,
        start: Ms,
        end: Ms,
    ) -> Result<(), EngineError> {
        if self.projects.len() >= MAX_PROJECTS {
            return Err(EngineError::LimitExceeded("too many projects"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("project name too long"));
        }
        if team_size < 1 {
            return Err(EngineError::LimitExceeded("team size must be at least 1"));
        }
        let window = validate_window(start, end)?;
        if self.projects.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ProjectAdded {
            id,
            name: name.clone(),
            team_size,
            window,
            status: ProjectStatus::Planning,
        };
        self.journal_append(&event).await?;
        self.projects.insert(
            id,
            Arc::new(RwLock::new(Project {
                id,
                name,
                team_size,
                window,
                status: ProjectStatus::Planning,
            })),
        );
        metrics::gauge!(observability::PROJECTS_ACTIVE).set(self.projects.len() as f64);
        self.feed.publish(id, &event);
        Ok(())
    }

    pub async fn set_project_status(
        &self,
        id: Ulid,
        status: ProjectStatus,
    ) -> Result<(), EngineError> {
        let project = self
            .get_project(&id)
            .ok_or(EngineError::ProjectNotFound(id))?;
        let mut guard = project.write().await;
        if !self.projects.contains_key(&id) {
            return Err(EngineError::ProjectNotFound(id));
        }
        let event = Event::ProjectStatusChanged { id, status };
        self.journal_append(&event).await?;
        guard.status = status;
        self.feed.publish(id, &event);
        Ok(())
    }

    pub async fn delete_project(&self, id: Ulid) -> Result<(), EngineError> {
        let project = self
            .get_project(&id)
            .ok_or(EngineError::ProjectNotFound(id))?;
        // Write lock held across the guard check, journal append, and map
        // removal. Assignment creation holds this lock's read side through
        // its own commit, so any creation that passed its project check has
        // already landed in project_assignments by the time we get here.
        let guard = project.write().await;
        if !self.projects.contains_key(&id) {
            return Err(EngineError::ProjectNotFound(id));
        }
        if let Some(ids) = self.project_assignments.get(&id)
            && !ids.is_empty()
        {
            return Err(EngineError::HasAssignments(id));
        }

        let event = Event::ProjectRemoved { id };
        self.journal_append(&event).await?;
        self.projects.remove(&id);
        self.project_assignments.remove(&id);
        drop(guard);
        metrics::gauge!(observability::PROJECTS_ACTIVE).set(self.projects.len() as f64);
        self.feed.publish(id, &event);
        self.feed.remove(&id);
        Ok(())
    }

    // ── Assignments ──────────────────────────────────────────

    pub async fn create_assignment(
        &self,
        id: Ulid,
        engineer_id: Ulid,
        project_id: Ulid,
        allocation: u32,
        start: Ms,
        end: Ms,
        role: Option<String>,
    ) -> Result<(), EngineError> {
        let result = self
            .create_assignment_inner(id, engineer_id, project_id, allocation, start, end, role)
            .await;
        count_mutation("create_assignment", result.is_ok());
        result
    }

    async fn create_assignment_inner(
        &self,
        id: Ulid,
        engineer_id: Ulid,
        project_id: Ulid,
        allocation: u32,
        start: Ms,
        end: Ms,
        role: Option<String>,
    ) -> Result<(), EngineError> {
        if !(MIN_ALLOCATION_PERCENT..=MAX_ALLOCATION_PERCENT).contains(&allocation) {
            return Err(EngineError::LimitExceeded(
                "allocation percentage must be between 1 and 100",
            ));
        }
        let window = validate_window(start, end)?;
        let role = role.unwrap_or_else(|| "Developer".to_string());
        if role.len() > MAX_ROLE_LEN {
            return Err(EngineError::LimitExceeded("role too long"));
        }
        if self.assignment_to_engineer.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let project = self
            .get_project(&project_id)
            .ok_or(EngineError::ProjectNotFound(project_id))?;
        let es = self
            .get_engineer(&engineer_id)
            .ok_or(EngineError::EngineerNotFound(engineer_id))?;

        // Lock order: project read, then engineer write, both held through
        // commit. The project read lock keeps delete_project from removing
        // the project mid-write; the engineer write lock serializes
        // concurrent creations for the same engineer, so the loser of the
        // race sees the winner's allocation in its overlap sum. The map
        // re-checks catch entities deleted between lookup and lock
        // acquisition.
        let _project_guard = project.read().await;
        if !self.projects.contains_key(&project_id) {
            return Err(EngineError::ProjectNotFound(project_id));
        }
        let mut guard = es.write().await;
        if !self.engineers.contains_key(&engineer_id) {
            return Err(EngineError::EngineerNotFound(engineer_id));
        }
        if guard.assignments.len() >= MAX_ASSIGNMENTS_PER_ENGINEER {
            return Err(EngineError::LimitExceeded("too many assignments for engineer"));
        }

        self.enforce_capacity(&guard, &window, allocation, None)?;

        let event = Event::AssignmentCreated {
            id,
            engineer_id,
            project_id,
            allocation,
            window,
            role,
        };
        self.persist_and_apply(engineer_id, &mut guard, &event).await
    }

    /// Partially update an assignment. Merged values are revalidated as a
    /// whole, with the assignment's own prior record excluded from the
    /// overlap sum.
    pub async fn update_assignment(
        &self,
        id: Ulid,
        changes: AssignmentChange,
    ) -> Result<Ulid, EngineError> {
        let result = self.update_assignment_inner(id, changes).await;
        count_mutation("update_assignment", result.is_ok());
        result
    }

    async fn update_assignment_inner(
        &self,
        id: Ulid,
        changes: AssignmentChange,
    ) -> Result<Ulid, EngineError> {
        if let Some(allocation) = changes.allocation
            && !(MIN_ALLOCATION_PERCENT..=MAX_ALLOCATION_PERCENT).contains(&allocation)
        {
            return Err(EngineError::LimitExceeded(
                "allocation percentage must be between 1 and 100",
            ));
        }
        if let Some(ref role) = changes.role
            && role.len() > MAX_ROLE_LEN
        {
            return Err(EngineError::LimitExceeded("role too long"));
        }

        let (engineer_id, mut guard) = self.resolve_assignment_write(&id).await?;
        let current = guard
            .find_assignment(id)
            .ok_or(EngineError::AssignmentNotFound(id))?;

        let allocation = changes.allocation.unwrap_or(current.allocation);
        let start = changes.start.unwrap_or(current.window.start);
        let end = changes.end.unwrap_or(current.window.end);
        let role = changes.role.unwrap_or_else(|| current.role.clone());
        let window = validate_window(start, end)?;

        self.enforce_capacity(&guard, &window, allocation, Some(id))?;

        let event = Event::AssignmentUpdated {
            id,
            engineer_id,
            allocation,
            window,
            role,
        };
        self.persist_and_apply(engineer_id, &mut guard, &event).await?;
        Ok(engineer_id)
    }

    /// Delete an assignment. Always allowed, removal only frees capacity.
    pub async fn delete_assignment(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let result = self.delete_assignment_inner(id).await;
        count_mutation("delete_assignment", result.is_ok());
        result
    }

    async fn delete_assignment_inner(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (engineer_id, mut guard) = self.resolve_assignment_write(&id).await?;
        let event = Event::AssignmentDeleted { id, engineer_id };
        self.persist_and_apply(engineer_id, &mut guard, &event).await?;
        Ok(engineer_id)
    }

    fn enforce_capacity(
        &self,
        engineer: &EngineerState,
        window: &Window,
        allocation: u32,
        exclude: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let check = check_capacity(engineer, window, allocation, exclude);
        if let Err(EngineError::CapacityExceeded {
            available,
            requested,
        }) = &check
        {
            metrics::counter!(observability::CAPACITY_REJECTIONS_TOTAL).increment(1);
            tracing::debug!(
                engineer = %engineer.id,
                available,
                requested,
                "assignment rejected: capacity exceeded"
            );
        }
        check
    }
}

/// Partial update for `update_assignment`. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct AssignmentChange {
    pub allocation: Option<u32>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub role: Option<String>,
}
