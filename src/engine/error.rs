use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    EngineerNotFound(Ulid),
    ProjectNotFound(Ulid),
    AssignmentNotFound(Ulid),
    AlreadyExists(Ulid),
    /// End date not strictly after start date.
    InvalidInterval,
    /// The capacity ceiling would be exceeded. `available` is what the
    /// engineer still has free over the candidate window (negative when
    /// existing overlap already exceeds a lowered capacity).
    CapacityExceeded { available: i64, requested: u32 },
    HasAssignments(Ulid),
    LimitExceeded(&'static str),
    JournalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::EngineerNotFound(id) => write!(f, "engineer not found: {id}"),
            EngineError::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            EngineError::AssignmentNotFound(id) => write!(f, "assignment not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidInterval => write!(f, "end date must be after start date"),
            EngineError::CapacityExceeded {
                available,
                requested,
            } => {
                write!(
                    f,
                    "assignment exceeds engineer capacity: available {available}%, requested {requested}%"
                )
            }
            EngineError::HasAssignments(id) => {
                write!(f, "cannot delete {id}: assignments still reference it")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
