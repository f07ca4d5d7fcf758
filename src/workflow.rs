//! Per-type ticket workflows.
//!
//! Each ticket type owns a small directed transition graph with a single
//! initial status and one or more terminal statuses. The tables here are the
//! only authority on which status changes are legal; the service consults
//! them before every write. Everything in this module is pure and shareable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TicketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    Task,
    Bug,
    Feature,
    Decision,
}

impl TicketType {
    pub const ALL: [TicketType; 4] = [
        TicketType::Task,
        TicketType::Bug,
        TicketType::Feature,
        TicketType::Decision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketType::Task => "task",
            TicketType::Bug => "bug",
            TicketType::Feature => "feature",
            TicketType::Decision => "decision",
        }
    }

    pub fn parse(value: &str) -> Result<Self, TicketError> {
        match value {
            "task" => Ok(TicketType::Task),
            "bug" => Ok(TicketType::Bug),
            "feature" => Ok(TicketType::Feature),
            "decision" => Ok(TicketType::Decision),
            other => Err(TicketError::Validation(format!(
                "unknown ticket type '{}' (expected task, bug, feature or decision)",
                other
            ))),
        }
    }

    fn workflow(&self) -> &'static Workflow {
        match self {
            TicketType::Task => &TASK,
            TicketType::Bug => &BUG,
            TicketType::Feature => &FEATURE,
            TicketType::Decision => &DECISION,
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Result<Self, TicketError> {
        match value {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(TicketError::Validation(format!(
                "unknown priority '{}' (expected low, medium, high or urgent)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Blocks,
    Parent,
    Related,
    Duplicate,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Blocks => "blocks",
            LinkType::Parent => "parent",
            LinkType::Related => "related",
            LinkType::Duplicate => "duplicate",
        }
    }

    pub fn parse(value: &str) -> Result<Self, TicketError> {
        match value {
            "blocks" => Ok(LinkType::Blocks),
            "parent" => Ok(LinkType::Parent),
            "related" => Ok(LinkType::Related),
            "duplicate" => Ok(LinkType::Duplicate),
            other => Err(TicketError::Validation(format!(
                "unknown link type '{}' (expected blocks, parent, related or duplicate)",
                other
            ))),
        }
    }
}

/// Transition graph for one ticket type.
struct Workflow {
    statuses: &'static [&'static str],
    initial: &'static str,
    terminal: &'static [&'static str],
    edges: &'static [(&'static str, &'static str)],
    /// Terminals in the order `close` prefers them.
    close_preference: &'static [&'static str],
}

static TASK: Workflow = Workflow {
    statuses: &["backlog", "in_progress", "done", "cancelled"],
    initial: "backlog",
    terminal: &["done", "cancelled"],
    edges: &[
        ("backlog", "in_progress"),
        ("backlog", "cancelled"),
        ("in_progress", "done"),
        ("in_progress", "cancelled"),
    ],
    close_preference: &["done", "cancelled"],
};

static BUG: Workflow = Workflow {
    statuses: &["triage", "confirmed", "in_progress", "resolved", "wont_fix"],
    initial: "triage",
    terminal: &["resolved", "wont_fix"],
    edges: &[
        ("triage", "confirmed"),
        ("triage", "wont_fix"),
        ("confirmed", "in_progress"),
        ("confirmed", "wont_fix"),
        ("in_progress", "resolved"),
        ("in_progress", "wont_fix"),
    ],
    close_preference: &["resolved", "wont_fix"],
};

static FEATURE: Workflow = Workflow {
    statuses: &["proposed", "approved", "in_progress", "shipped", "rejected"],
    initial: "proposed",
    terminal: &["shipped", "rejected"],
    edges: &[
        ("proposed", "approved"),
        ("proposed", "rejected"),
        ("approved", "in_progress"),
        ("approved", "rejected"),
        ("in_progress", "shipped"),
        ("in_progress", "rejected"),
    ],
    close_preference: &["shipped", "rejected"],
};

// `deferred` is terminal but keeps a reopen edge back to `open`.
static DECISION: Workflow = Workflow {
    statuses: &["open", "decided", "deferred"],
    initial: "open",
    terminal: &["decided", "deferred"],
    edges: &[
        ("open", "decided"),
        ("open", "deferred"),
        ("deferred", "open"),
    ],
    close_preference: &["decided", "deferred"],
};

/// The status a freshly created ticket starts in.
pub fn initial_status(ticket_type: TicketType) -> &'static str {
    ticket_type.workflow().initial
}

/// All statuses declared for a type, in declaration order.
pub fn statuses(ticket_type: TicketType) -> &'static [&'static str] {
    ticket_type.workflow().statuses
}

/// All legal edges for a type.
pub fn edges(ticket_type: TicketType) -> &'static [(&'static str, &'static str)] {
    ticket_type.workflow().edges
}

pub fn is_terminal(ticket_type: TicketType, status: &str) -> bool {
    ticket_type.workflow().terminal.contains(&status)
}

pub fn is_valid_status(ticket_type: TicketType, status: &str) -> bool {
    ticket_type.workflow().statuses.contains(&status)
}

/// Checks a single status change against the type's graph.
///
/// Exact-edge semantics: self-edges and skip-ahead moves are rejected along
/// with anything else not listed.
pub fn validate_transition(
    ticket_type: TicketType,
    from: &str,
    to: &str,
) -> Result<(), TicketError> {
    let workflow = ticket_type.workflow();
    if workflow.edges.iter().any(|&(f, t)| f == from && t == to) {
        Ok(())
    } else {
        Err(TicketError::InvalidTransition(format!(
            "cannot move {} ticket from '{}' to '{}'",
            ticket_type, from, to
        )))
    }
}

/// Resolves the terminal status `close` should move to: the first terminal in
/// the type's preference order that is one edge away from `current`.
pub fn closing_status(
    ticket_type: TicketType,
    current: &str,
) -> Result<&'static str, TicketError> {
    let workflow = ticket_type.workflow();
    for &terminal in workflow.close_preference {
        if workflow
            .edges
            .iter()
            .any(|&(f, t)| f == current && t == terminal)
        {
            return Ok(terminal);
        }
    }
    Err(TicketError::InvalidTransition(format!(
        "no terminal status reachable from '{}' for {} ticket",
        current, ticket_type
    )))
}

/// Status set for `board`: one type's statuses, or the first-seen union
/// across all four types when no type is given.
pub fn status_union(ticket_type: Option<TicketType>) -> Vec<&'static str> {
    match ticket_type {
        Some(ty) => statuses(ty).to_vec(),
        None => {
            let mut union = Vec::new();
            for ty in TicketType::ALL {
                for &status in statuses(ty) {
                    if !union.contains(&status) {
                        union.push(status);
                    }
                }
            }
            union
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_statuses() {
        assert_eq!(initial_status(TicketType::Task), "backlog");
        assert_eq!(initial_status(TicketType::Bug), "triage");
        assert_eq!(initial_status(TicketType::Feature), "proposed");
        assert_eq!(initial_status(TicketType::Decision), "open");
    }

    #[test]
    fn every_listed_edge_is_valid() {
        for ty in TicketType::ALL {
            for &(from, to) in edges(ty) {
                assert!(
                    validate_transition(ty, from, to).is_ok(),
                    "{ty}: {from} -> {to} should be legal"
                );
            }
        }
    }

    #[test]
    fn edges_stay_inside_the_declared_status_set() {
        for ty in TicketType::ALL {
            for &(from, to) in edges(ty) {
                assert!(is_valid_status(ty, from));
                assert!(is_valid_status(ty, to));
            }
        }
    }

    #[test]
    fn self_edges_rejected() {
        for ty in TicketType::ALL {
            for &status in statuses(ty) {
                assert!(validate_transition(ty, status, status).is_err());
            }
        }
    }

    #[test]
    fn skip_ahead_rejected() {
        assert!(validate_transition(TicketType::Task, "backlog", "done").is_err());
        assert!(validate_transition(TicketType::Bug, "triage", "in_progress").is_err());
        assert!(validate_transition(TicketType::Bug, "triage", "resolved").is_err());
        assert!(validate_transition(TicketType::Feature, "proposed", "shipped").is_err());
    }

    #[test]
    fn cross_type_statuses_rejected() {
        let err = validate_transition(TicketType::Task, "backlog", "triage").unwrap_err();
        assert_eq!(err.kind(), "InvalidTransition");
    }

    #[test]
    fn terminals_have_no_outgoing_edges_except_deferred() {
        for ty in TicketType::ALL {
            for &(from, _) in edges(ty) {
                if is_terminal(ty, from) {
                    assert_eq!((ty, from), (TicketType::Decision, "deferred"));
                }
            }
        }
    }

    #[test]
    fn decision_reopen_edge() {
        assert!(validate_transition(TicketType::Decision, "deferred", "open").is_ok());
        assert!(validate_transition(TicketType::Decision, "decided", "open").is_err());
    }

    #[test]
    fn close_prefers_the_positive_terminal() {
        assert_eq!(
            closing_status(TicketType::Task, "in_progress").unwrap(),
            "done"
        );
        assert_eq!(
            closing_status(TicketType::Bug, "in_progress").unwrap(),
            "resolved"
        );
        assert_eq!(
            closing_status(TicketType::Feature, "in_progress").unwrap(),
            "shipped"
        );
        assert_eq!(closing_status(TicketType::Decision, "open").unwrap(), "decided");
    }

    #[test]
    fn close_falls_back_when_preferred_terminal_unreachable() {
        // From backlog only `cancelled` is one edge away.
        assert_eq!(closing_status(TicketType::Task, "backlog").unwrap(), "cancelled");
        assert_eq!(closing_status(TicketType::Bug, "triage").unwrap(), "wont_fix");
        assert_eq!(
            closing_status(TicketType::Feature, "proposed").unwrap(),
            "rejected"
        );
    }

    #[test]
    fn close_from_terminal_fails() {
        // Includes decision.deferred: its reopen edge leads to a
        // non-terminal, so close still has nowhere to go.
        for ty in TicketType::ALL {
            for &terminal in ty.workflow().terminal {
                assert!(closing_status(ty, terminal).is_err());
            }
        }
    }

    #[test]
    fn status_union_per_type_matches_declaration() {
        assert_eq!(
            status_union(Some(TicketType::Task)),
            vec!["backlog", "in_progress", "done", "cancelled"]
        );
    }

    #[test]
    fn status_union_across_types_dedupes_first_seen() {
        let union = status_union(None);
        assert_eq!(union.iter().filter(|s| **s == "in_progress").count(), 1);
        assert!(union.contains(&"backlog"));
        assert!(union.contains(&"wont_fix"));
        assert!(union.contains(&"deferred"));
        // First-seen order: task statuses lead.
        assert_eq!(union[0], "backlog");
        assert_eq!(union[1], "in_progress");
    }

    #[test]
    fn enum_parsing() {
        assert_eq!(TicketType::parse("bug").unwrap(), TicketType::Bug);
        assert!(TicketType::parse("epic").is_err());
        assert_eq!(Priority::parse("urgent").unwrap(), Priority::Urgent);
        assert!(Priority::parse("critical").is_err());
        assert_eq!(LinkType::parse("blocks").unwrap(), LinkType::Blocks);
        assert!(LinkType::parse("fixes").is_err());
    }

    #[test]
    fn serde_round_trip_uses_snake_case() {
        let ty: TicketType = serde_json::from_str("\"feature\"").unwrap();
        assert_eq!(ty, TicketType::Feature);
        assert_eq!(serde_json::to_string(&Priority::Medium).unwrap(), "\"medium\"");
    }
}
