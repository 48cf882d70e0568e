//! Decides who may operate a tournament clock.

use std::collections::HashSet;

use crate::dao::models::TournamentEntity;

/// Authorization collaborator consulted before every control operation.
pub trait Authorizer: Send + Sync {
    /// Whether `user_id` may act on `tournament`.
    fn is_authorized(&self, user_id: &str, tournament: &TournamentEntity) -> bool;

    /// Whether `user_id` holds global administrator rights.
    fn is_admin(&self, user_id: &str) -> bool;
}

/// Grants access to the organizer, the club staff and the configured administrators.
#[derive(Debug, Clone, Default)]
pub struct RosterAuthorizer {
    admins: HashSet<String>,
}

impl RosterAuthorizer {
    /// Build an authorizer with the given administrator ids.
    pub fn new(admins: impl IntoIterator<Item = String>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl Authorizer for RosterAuthorizer {
    fn is_authorized(&self, user_id: &str, tournament: &TournamentEntity) -> bool {
        !user_id.is_empty() && (self.is_admin(user_id) || tournament.is_roster_member(user_id))
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(user_id)
    }
}
