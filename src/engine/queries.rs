use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::capacity::{available_capacity, current_workload};
use super::{Engine, EngineError, SharedEngineerState, SharedProject};

/// Filter for assignment listings. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentFilter {
    pub engineer_id: Option<Ulid>,
    pub project_id: Option<Ulid>,
    pub status: Option<AssignmentStatus>,
}

fn engineer_info(es: &EngineerState, now: Ms) -> EngineerInfo {
    EngineerInfo {
        id: es.id,
        name: es.name.clone(),
        max_capacity: es.max_capacity,
        available_capacity: available_capacity(es, now),
        current_workload: current_workload(es, now).round() as u32,
    }
}

fn assignment_info(engineer_id: Ulid, a: &Assignment, now: Ms) -> AssignmentInfo {
    AssignmentInfo {
        id: a.id,
        engineer_id,
        project_id: a.project_id,
        allocation: a.allocation,
        start: a.window.start,
        end: a.window.end,
        role: a.role.clone(),
        status: a.status(now),
        duration_days: a.window.duration_days(),
    }
}

impl Engine {
    /// Snapshot the engineer Arcs up front so no DashMap shard lock is held
    /// across an await.
    fn engineer_snapshot(&self) -> Vec<SharedEngineerState> {
        self.engineers.iter().map(|e| e.value().clone()).collect()
    }

    /// All engineers with their capacity figures at `now`, optionally keeping
    /// only those with at least `min_available` percent free.
    pub async fn list_engineers(
        &self,
        min_available: Option<u32>,
        now: Ms,
    ) -> Vec<EngineerInfo> {
        let mut out = Vec::new();
        for es in self.engineer_snapshot() {
            let guard = es.read().await;
            let info = engineer_info(&guard, now);
            if min_available.is_none_or(|min| info.available_capacity >= min) {
                out.push(info);
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    /// Capacity breakdown for one engineer: headline figures plus the active
    /// and upcoming assignments behind them. Completed assignments are omitted.
    pub async fn capacity_report(
        &self,
        engineer_id: Ulid,
        now: Ms,
    ) -> Result<CapacityReport, EngineError> {
        let es = self
            .get_engineer(&engineer_id)
            .ok_or(EngineError::EngineerNotFound(engineer_id))?;
        let guard = es.read().await;

        let mut active = Vec::new();
        let mut upcoming = Vec::new();
        for a in &guard.assignments {
            match a.status(now) {
                AssignmentStatus::Active => active.push(assignment_info(engineer_id, a, now)),
                AssignmentStatus::Upcoming => upcoming.push(assignment_info(engineer_id, a, now)),
                AssignmentStatus::Completed => {}
            }
        }

        Ok(CapacityReport {
            engineer: engineer_info(&guard, now),
            active,
            upcoming,
        })
    }

    pub async fn engineer_available_capacity(
        &self,
        engineer_id: Ulid,
        now: Ms,
    ) -> Result<u32, EngineError> {
        let es = self
            .get_engineer(&engineer_id)
            .ok_or(EngineError::EngineerNotFound(engineer_id))?;
        let guard = es.read().await;
        Ok(available_capacity(&guard, now))
    }

    pub async fn engineer_workload(
        &self,
        engineer_id: Ulid,
        now: Ms,
    ) -> Result<f64, EngineError> {
        let es = self
            .get_engineer(&engineer_id)
            .ok_or(EngineError::EngineerNotFound(engineer_id))?;
        let guard = es.read().await;
        Ok(current_workload(&guard, now))
    }

    /// Assignments matching the filter, newest start date first.
    pub async fn list_assignments(
        &self,
        filter: AssignmentFilter,
        now: Ms,
    ) -> Vec<AssignmentInfo> {
        let sources = match filter.engineer_id {
            Some(id) => self.get_engineer(&id).into_iter().collect(),
            None => self.engineer_snapshot(),
        };

        let mut out = Vec::new();
        for es in sources {
            let guard = es.read().await;
            for a in &guard.assignments {
                if let Some(pid) = filter.project_id
                    && a.project_id != pid
                {
                    continue;
                }
                if let Some(status) = filter.status
                    && a.status(now) != status
                {
                    continue;
                }
                out.push(assignment_info(guard.id, a, now));
            }
        }
        out.sort_by(|a, b| b.start.cmp(&a.start).then(a.id.cmp(&b.id)));
        out
    }

    /// Count of assignments for the project whose window covers `now`.
    pub async fn current_team_size(
        &self,
        project_id: Ulid,
        now: Ms,
    ) -> Result<usize, EngineError> {
        if !self.projects.contains_key(&project_id) {
            return Err(EngineError::ProjectNotFound(project_id));
        }
        let assignment_ids = self
            .project_assignments
            .get(&project_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        // Group by engineer so each state is locked once.
        let mut by_engineer: HashMap<Ulid, Vec<Ulid>> = HashMap::new();
        for aid in assignment_ids {
            if let Some(eid) = self.engineer_for_assignment(&aid) {
                by_engineer.entry(eid).or_default().push(aid);
            }
        }

        let mut count = 0;
        for (eid, aids) in by_engineer {
            let Some(es) = self.get_engineer(&eid) else {
                continue;
            };
            let guard = es.read().await;
            for aid in aids {
                if let Some(a) = guard.find_assignment(aid)
                    && a.is_active(now)
                {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    pub async fn needs_more_members(
        &self,
        project_id: Ulid,
        now: Ms,
    ) -> Result<bool, EngineError> {
        let project = self
            .get_project(&project_id)
            .ok_or(EngineError::ProjectNotFound(project_id))?;
        let team_size = project.read().await.team_size;
        let current = self.current_team_size(project_id, now).await?;
        Ok(current < team_size as usize)
    }

    /// All projects with their current staffing level at `now`.
    pub async fn list_projects(&self, now: Ms) -> Vec<ProjectInfo> {
        let projects: Vec<SharedProject> =
            self.projects.iter().map(|e| e.value().clone()).collect();

        let mut out = Vec::new();
        for p in projects {
            let p = p.read().await.clone();
            let current = self.current_team_size(p.id, now).await.unwrap_or(0);
            out.push(ProjectInfo {
                id: p.id,
                name: p.name,
                team_size: p.team_size,
                start: p.window.start,
                end: p.window.end,
                status: p.status,
                current_team_size: current,
                needs_more_members: current < p.team_size as usize,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }
}
