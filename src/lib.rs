pub mod compactor;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;

pub use engine::{Engine, EngineError};
pub use model::{Assignment, AssignmentStatus, Ms, Window};
