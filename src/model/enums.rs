use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Workflow status shared by every entity; stored as an INT.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
pub enum Status {
    #[default]
    Pending = 0,
    Active = 1,
    Inactive = 2,
    Approved = 3,
    Rejected = 4,
}

impl Status {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Status::Pending),
            1 => Some(Status::Active),
            2 => Some(Status::Inactive),
            3 => Some(Status::Approved),
            4 => Some(Status::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, EnumIter)]
pub enum PunchType {
    In = 0,
    Out = 1,
    BreakStart = 2,
    BreakEnd = 3,
}

impl PunchType {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(PunchType::In),
            1 => Some(PunchType::Out),
            2 => Some(PunchType::BreakStart),
            3 => Some(PunchType::BreakEnd),
            _ => None,
        }
    }
}

/// What happens to dependents when a principal row is deleted.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Display, ToSchema)]
pub enum DeleteBehavior {
    Cascade,
    SetNull,
    NoAction,
}
