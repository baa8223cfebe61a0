//! Core domain types for the forge bridge bots.
//!
//! This module contains the identifiers and forge snapshot types used throughout
//! the crate.

pub mod ids;
pub mod pr;

// Re-export commonly used types at the module level
pub use ids::{CommentId, InvalidSha, PrNumber, RepoId, Sha};
pub use pr::{
    Branch, Comment, CommitComment, HostUser, PrState, PullRequest, Review, ReviewComment,
    Verdict, labels,
};
