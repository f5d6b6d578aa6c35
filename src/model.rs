use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

const DAY_MS: Ms = 86_400_000;

/// Closed interval `[start, end]`.
///
/// Staffing windows are boundary-inclusive: an assignment ending on day D and
/// another starting on day D occupy the engineer at the same instant and count
/// as overlapping. Do not tighten this to half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Ms,
    pub end: Ms,
}

impl Window {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Duration in days, rounded up. Partial days count as a full day.
    pub fn duration_days(&self) -> i64 {
        (self.duration_ms() + DAY_MS - 1) / DAY_MS
    }

    /// Closed-interval intersection: touching endpoints overlap.
    pub fn overlaps(&self, other: &Window) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Derived at read time from the window and the clock. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    Active,
    Upcoming,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Upcoming => "upcoming",
            AssignmentStatus::Completed => "completed",
        }
    }
}

/// One time-boxed allocation of an engineer to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Ulid,
    pub project_id: Ulid,
    /// Percentage of the engineer's bandwidth consumed, 1–100.
    pub allocation: u32,
    pub window: Window,
    pub role: String,
}

impl Assignment {
    pub fn is_active(&self, now: Ms) -> bool {
        self.window.contains_instant(now)
    }

    pub fn status(&self, now: Ms) -> AssignmentStatus {
        if self.window.contains_instant(now) {
            AssignmentStatus::Active
        } else if self.window.start > now {
            AssignmentStatus::Upcoming
        } else {
            AssignmentStatus::Completed
        }
    }
}

/// An engineer plus all of their assignments, sorted by `window.start`.
#[derive(Debug, Clone)]
pub struct EngineerState {
    pub id: Ulid,
    pub name: String,
    /// Total allocatable bandwidth in percent (0–100, default 100).
    pub max_capacity: u32,
    pub assignments: Vec<Assignment>,
}

impl EngineerState {
    pub fn new(id: Ulid, name: String, max_capacity: u32) -> Self {
        Self {
            id,
            name,
            max_capacity,
            assignments: Vec::new(),
        }
    }

    /// Insert an assignment maintaining sort order by window.start.
    pub fn insert_assignment(&mut self, assignment: Assignment) {
        let pos = self
            .assignments
            .binary_search_by_key(&assignment.window.start, |a| a.window.start)
            .unwrap_or_else(|e| e);
        self.assignments.insert(pos, assignment);
    }

    pub fn remove_assignment(&mut self, id: Ulid) -> Option<Assignment> {
        if let Some(pos) = self.assignments.iter().position(|a| a.id == id) {
            Some(self.assignments.remove(pos))
        } else {
            None
        }
    }

    pub fn find_assignment(&self, id: Ulid) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.id == id)
    }

    /// Assignments whose window overlaps the query (closed-interval semantics).
    /// Binary search skips everything that starts after `query.end`.
    pub fn overlapping(&self, query: &Window) -> impl Iterator<Item = &Assignment> {
        // Everything at index >= right_bound starts after query.end → can't overlap.
        let right_bound = self
            .assignments
            .partition_point(|a| a.window.start <= query.end);
        self.assignments[..right_bound]
            .iter()
            .filter(move |a| a.window.end >= query.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    Planning,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Ulid,
    pub name: String,
    /// Headcount the project wants staffed at any one time.
    pub team_size: u32,
    pub window: Window,
    pub status: ProjectStatus,
}

/// Flat event types, no nesting. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    EngineerAdded {
        id: Ulid,
        name: String,
        max_capacity: u32,
    },
    EngineerUpdated {
        id: Ulid,
        name: String,
        max_capacity: u32,
    },
    EngineerRemoved {
        id: Ulid,
    },
    ProjectAdded {
        id: Ulid,
        name: String,
        team_size: u32,
        window: Window,
        status: ProjectStatus,
    },
    ProjectStatusChanged {
        id: Ulid,
        status: ProjectStatus,
    },
    ProjectRemoved {
        id: Ulid,
    },
    AssignmentCreated {
        id: Ulid,
        engineer_id: Ulid,
        project_id: Ulid,
        allocation: u32,
        window: Window,
        role: String,
    },
    AssignmentUpdated {
        id: Ulid,
        engineer_id: Ulid,
        allocation: u32,
        window: Window,
        role: String,
    },
    AssignmentDeleted {
        id: Ulid,
        engineer_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineerInfo {
    pub id: Ulid,
    pub name: String,
    pub max_capacity: u32,
    pub available_capacity: u32,
    /// Current workload percentage, rounded to the nearest whole percent.
    pub current_workload: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentInfo {
    pub id: Ulid,
    pub engineer_id: Ulid,
    pub project_id: Ulid,
    pub allocation: u32,
    pub start: Ms,
    pub end: Ms,
    pub role: String,
    pub status: AssignmentStatus,
    pub duration_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub id: Ulid,
    pub name: String,
    pub team_size: u32,
    pub start: Ms,
    pub end: Ms,
    pub status: ProjectStatus,
    pub current_team_size: usize,
    pub needs_more_members: bool,
}

/// Per-engineer capacity breakdown: headline figures plus the assignments
/// that produce them, split by status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityReport {
    pub engineer: EngineerInfo,
    pub active: Vec<AssignmentInfo>,
    pub upcoming: Vec<AssignmentInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Ms = 86_400_000;

    #[test]
    fn window_basics() {
        let w = Window::new(DAY, 3 * DAY);
        assert_eq!(w.duration_ms(), 2 * DAY);
        assert!(w.contains_instant(DAY));
        assert!(w.contains_instant(2 * DAY));
        assert!(w.contains_instant(3 * DAY)); // closed on both ends
        assert!(!w.contains_instant(3 * DAY + 1));
    }

    #[test]
    fn window_overlap_boundary_inclusive() {
        let a = Window::new(DAY, 10 * DAY);
        let b = Window::new(10 * DAY, 20 * DAY);
        // Touching endpoints count as overlap.
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn window_no_overlap_with_gap() {
        let a = Window::new(DAY, 9 * DAY);
        let b = Window::new(10 * DAY, 20 * DAY);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn window_containment_overlaps() {
        let outer = Window::new(0, 100 * DAY);
        let inner = Window::new(10 * DAY, 20 * DAY);
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn duration_days_rounds_up() {
        assert_eq!(Window::new(0, DAY).duration_days(), 1);
        assert_eq!(Window::new(0, DAY + 1).duration_days(), 2);
        assert_eq!(Window::new(0, 10 * DAY).duration_days(), 10);
    }

    #[test]
    fn assignment_status_derivation() {
        let a = Assignment {
            id: Ulid::new(),
            project_id: Ulid::new(),
            allocation: 50,
            window: Window::new(10 * DAY, 20 * DAY),
            role: "Developer".into(),
        };
        assert_eq!(a.status(5 * DAY), AssignmentStatus::Upcoming);
        assert_eq!(a.status(10 * DAY), AssignmentStatus::Active); // start inclusive
        assert_eq!(a.status(15 * DAY), AssignmentStatus::Active);
        assert_eq!(a.status(20 * DAY), AssignmentStatus::Active); // end inclusive
        assert_eq!(a.status(21 * DAY), AssignmentStatus::Completed);
    }

    fn assignment(start: Ms, end: Ms) -> Assignment {
        Assignment {
            id: Ulid::new(),
            project_id: Ulid::new(),
            allocation: 10,
            window: Window::new(start, end),
            role: "Developer".into(),
        }
    }

    #[test]
    fn assignment_ordering() {
        let mut es = EngineerState::new(Ulid::new(), "Ada".into(), 100);
        es.insert_assignment(assignment(30 * DAY, 40 * DAY));
        es.insert_assignment(assignment(10 * DAY, 20 * DAY));
        es.insert_assignment(assignment(20 * DAY, 30 * DAY));
        assert_eq!(es.assignments[0].window.start, 10 * DAY);
        assert_eq!(es.assignments[1].window.start, 20 * DAY);
        assert_eq!(es.assignments[2].window.start, 30 * DAY);
    }

    #[test]
    fn overlapping_scan_skips_disjoint() {
        let mut es = EngineerState::new(Ulid::new(), "Ada".into(), 100);
        es.insert_assignment(assignment(DAY, 2 * DAY)); // past
        es.insert_assignment(assignment(9 * DAY, 12 * DAY)); // overlaps
        es.insert_assignment(assignment(30 * DAY, 40 * DAY)); // future

        let query = Window::new(10 * DAY, 20 * DAY);
        let hits: Vec<_> = es.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].window, Window::new(9 * DAY, 12 * DAY));
    }

    #[test]
    fn overlapping_scan_includes_touching_endpoint() {
        let mut es = EngineerState::new(Ulid::new(), "Ada".into(), 100);
        es.insert_assignment(assignment(DAY, 10 * DAY));
        // Query starting exactly where the assignment ends still matches.
        let query = Window::new(10 * DAY, 20 * DAY);
        let hits: Vec<_> = es.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn overlapping_scan_empty_engineer() {
        let es = EngineerState::new(Ulid::new(), "Ada".into(), 100);
        let hits: Vec<_> = es.overlapping(&Window::new(0, DAY)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn remove_assignment_by_id() {
        let mut es = EngineerState::new(Ulid::new(), "Ada".into(), 100);
        let a = assignment(DAY, 2 * DAY);
        let id = a.id;
        es.insert_assignment(a);
        assert!(es.remove_assignment(id).is_some());
        assert!(es.assignments.is_empty());
        assert!(es.remove_assignment(id).is_none());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::AssignmentCreated {
            id: Ulid::new(),
            engineer_id: Ulid::new(),
            project_id: Ulid::new(),
            allocation: 60,
            window: Window::new(DAY, 30 * DAY),
            role: "Tech Lead".into(),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
