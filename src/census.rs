//! Project census lookups.
//!
//! The census maps forge accounts to project contributors and knows each
//! contributor's role. It is an external collaborator; this module defines the
//! predicates the bots derive from it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::git::CommitIdentity;
use crate::types::HostUser;

/// A contributor's role in the project, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    None,
    Author,
    Committer,
    Reviewer,
    Lead,
}

impl ProjectRole {
    /// Committers, Reviewers and Leads may push to the repository.
    pub fn may_commit(&self) -> bool {
        *self >= ProjectRole::Committer
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectRole::None => "no project role",
            ProjectRole::Author => "Author",
            ProjectRole::Committer => "Committer",
            ProjectRole::Reviewer => "Reviewer",
            ProjectRole::Lead => "Lead",
        };
        f.write_str(s)
    }
}

/// A census entry linked to a forge account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub username: String,
    pub full_name: Option<String>,
}

/// Census data for the project the bot serves.
pub trait Census: Send + Sync {
    /// The contributor linked to a forge account, if any.
    fn contributor(&self, user: &HostUser) -> Option<Contributor>;

    /// The role of a census username in the configured project and version.
    fn role(&self, username: &str) -> ProjectRole;

    /// Mail domain for census usernames (e.g. `openjdk.org`).
    fn domain(&self) -> &str;

    /// Namespace linking forge accounts to census usernames (e.g. `github.com`).
    fn namespace(&self) -> &str;
}

impl dyn Census + '_ {
    /// Role of a forge user; users without a census entry have no role.
    pub fn role_of(&self, user: &HostUser) -> ProjectRole {
        match self.contributor(user) {
            Some(contributor) => self.role(&contributor.username),
            None => ProjectRole::None,
        }
    }

    pub fn may_commit(&self, user: &HostUser) -> bool {
        self.role_of(user).may_commit()
    }

    /// Identity used when creating commits for a forge user.
    pub fn commit_identity(&self, user: &HostUser) -> CommitIdentity {
        match self.contributor(user) {
            Some(contributor) => CommitIdentity {
                name: contributor
                    .full_name
                    .unwrap_or_else(|| user.full_name.clone()),
                email: format!("{}@{}", contributor.username, self.domain()),
                signing_key: None,
            },
            None => CommitIdentity {
                name: user.full_name.clone(),
                email: format!("{}+{}@users.{}", user.id, user.username, self.namespace()),
                signing_key: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeCensus;

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(ProjectRole::Lead.may_commit());
        assert!(ProjectRole::Reviewer.may_commit());
        assert!(ProjectRole::Committer.may_commit());
        assert!(!ProjectRole::Author.may_commit());
        assert!(!ProjectRole::None.may_commit());
    }

    #[test]
    fn unknown_users_cannot_commit() {
        let census = FakeCensus::new();
        let census: &dyn Census = &census;
        let stranger = HostUser::new(99, "stranger", "Stranger");
        assert_eq!(census.role_of(&stranger), ProjectRole::None);
        assert!(!census.may_commit(&stranger));
    }

    #[test]
    fn commit_identity_prefers_census_name() {
        let census = FakeCensus::new().with_contributor(
            HostUser::new(1, "gh-duke", "Forge Duke"),
            "duke",
            Some("Duke Java"),
            ProjectRole::Committer,
        );
        let census: &dyn Census = &census;
        let identity = census.commit_identity(&HostUser::new(1, "gh-duke", "Forge Duke"));
        assert_eq!(identity.name, "Duke Java");
        assert_eq!(identity.email, "duke@openjdk.org");
    }

    #[test]
    fn commit_identity_falls_back_to_forge_account() {
        let census = FakeCensus::new();
        let census: &dyn Census = &census;
        let identity = census.commit_identity(&HostUser::new(5, "newbie", "New Bie"));
        assert_eq!(identity.name, "New Bie");
        assert_eq!(identity.email, "5+newbie@users.github.com");
    }
}
