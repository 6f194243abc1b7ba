//! Per-student progress markers.
//!
//! Progress is persisted as the presence of individual marker objects, so more
//! than one marker can exist for the same student. [`MarkerSet::state`] is the
//! only place that turns those flags into a [`MarkerState`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object names stored under a student's key prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Building,
    Completed,
    Rebuild,
    StackSnapshot,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 4] = [
        MarkerKind::Building,
        MarkerKind::Completed,
        MarkerKind::Rebuild,
        MarkerKind::StackSnapshot,
    ];

    pub fn object_name(&self) -> &'static str {
        match self {
            MarkerKind::Building => "building",
            MarkerKind::Completed => "completed",
            MarkerKind::Rebuild => "rebuild",
            MarkerKind::StackSnapshot => "cf_params.json",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerState {
    None,
    Building,
    Complete,
    RebuildPending,
}

impl MarkerState {
    pub fn is_complete(&self) -> bool {
        matches!(self, MarkerState::Complete)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarkerState::None => "pending",
            MarkerState::Building => "building",
            MarkerState::Complete => "complete",
            MarkerState::RebuildPending => "rebuilding",
        }
    }
}

impl fmt::Display for MarkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which state markers are present for one student.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkerSet {
    pub building: bool,
    pub completed: bool,
    pub rebuild: bool,
}

impl MarkerSet {
    /// Precedence: completed, then rebuild, then building.
    pub fn state(&self) -> MarkerState {
        if self.completed {
            MarkerState::Complete
        } else if self.rebuild {
            MarkerState::RebuildPending
        } else if self.building {
            MarkerState::Building
        } else {
            MarkerState::None
        }
    }
}
