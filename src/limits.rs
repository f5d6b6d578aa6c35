//! Hard caps. Everything here exists to bound memory and journal growth;
//! violations surface as `EngineError::LimitExceeded`.

use crate::model::Ms;

pub const MAX_ENGINEERS: usize = 100_000;
pub const MAX_PROJECTS: usize = 100_000;
pub const MAX_ASSIGNMENTS_PER_ENGINEER: usize = 10_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_ROLE_LEN: usize = 64;

/// Capacity and allocation are whole percentages.
pub const MAX_CAPACITY_PERCENT: u32 = 100;
pub const MIN_ALLOCATION_PERCENT: u32 = 1;
pub const MAX_ALLOCATION_PERCENT: u32 = 100;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// 10 years. No staffing assignment runs longer.
pub const MAX_WINDOW_DURATION_MS: Ms = 10 * 365 * 86_400_000;
