use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Proposal status as stored in `proposals.status`.
///
/// ```text
/// draft ──send──▶ sent ──accept──▶ accepted
///                  │  ▲
///                  │  └─ resend
///                  └──decline──▶ declined
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Sent,
    Accepted,
    Declined,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::Sent => "sent",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Declined => "declined",
        }
    }

    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Sent) | (Sent, Accepted) | (Sent, Declined)
        )
    }

    /// Scope and pricing may change until the client has responded.
    pub fn is_editable(self) -> bool {
        matches!(self, ProposalStatus::Draft | ProposalStatus::Sent)
    }

    /// An accepted proposal is a signed agreement and is kept.
    pub fn is_deletable(self) -> bool {
        self != ProposalStatus::Accepted
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProposalStatus::Accepted | ProposalStatus::Declined)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProposalStatus::Draft),
            "sent" => Ok(ProposalStatus::Sent),
            "accepted" => Ok(ProposalStatus::Accepted),
            "declined" => Ok(ProposalStatus::Declined),
            other => Err(format!("unknown proposal status '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProposalStatus::*;
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Draft.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Accepted));
        assert!(Sent.can_transition_to(Declined));
    }

    #[test]
    fn test_resend_is_allowed() {
        assert!(Sent.can_transition_to(Sent));
    }

    #[test]
    fn test_cannot_accept_unsent_draft() {
        assert!(!Draft.can_transition_to(Accepted));
        assert!(!Draft.can_transition_to(Declined));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [Accepted, Declined] {
            assert!(from.is_terminal());
            for to in [Draft, Sent, Accepted, Declined] {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_edit_and_delete_rules() {
        assert!(Draft.is_editable());
        assert!(Sent.is_editable());
        assert!(!Accepted.is_editable());
        assert!(!Declined.is_editable());
        assert!(Declined.is_deletable());
        assert!(!Accepted.is_deletable());
    }

    #[test]
    fn test_round_trips_through_str() {
        for s in [Draft, Sent, Accepted, Declined] {
            assert_eq!(s.as_str().parse::<ProposalStatus>().unwrap(), s);
        }
        assert!("signed".parse::<ProposalStatus>().is_err());
    }
}
