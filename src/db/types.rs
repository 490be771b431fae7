use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};

use std::fmt;

/// Lifecycle state of a manual, mirrored on its revisions.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Manual_status"]
#[serde(rename_all = "snake_case")]
pub enum ManualStatus {
    /// Manual is being edited and has no revision under review.
    Draft,
    /// A revision has been submitted and awaits a decision.
    InReview,
    /// The latest submitted revision was approved.
    Approved,
    /// The latest submitted revision was rejected. The manual can be edited
    /// and resubmitted.
    Rejected,
}

impl ManualStatus {
    /// Can a manual in this state be submitted for review?
    pub fn can_submit(self) -> bool {
        match self {
            ManualStatus::Draft | ManualStatus::Rejected => true,
            ManualStatus::InReview | ManualStatus::Approved => false,
        }
    }

    /// Can a review decision (approve or reject) be made in this state?
    pub fn can_decide(self) -> bool {
        self == ManualStatus::InReview
    }
}

impl fmt::Display for ManualStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            ManualStatus::Draft => "draft",
            ManualStatus::InReview => "in_review",
            ManualStatus::Approved => "approved",
            ManualStatus::Rejected => "rejected",
        })
    }
}

/// Kind of mutation recorded in the field history.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Change_type"]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_allowed_only_from_draft_or_rejected() {
        assert!(ManualStatus::Draft.can_submit());
        assert!(ManualStatus::Rejected.can_submit());
        assert!(!ManualStatus::InReview.can_submit());
        assert!(!ManualStatus::Approved.can_submit());
    }

    #[test]
    fn decisions_allowed_only_in_review() {
        assert!(ManualStatus::InReview.can_decide());
        assert!(!ManualStatus::Draft.can_decide());
        assert!(!ManualStatus::Approved.can_decide());
        assert!(!ManualStatus::Rejected.can_decide());
    }
}
