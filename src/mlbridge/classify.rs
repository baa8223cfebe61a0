//! Which forge activity gets mirrored to the list.

use std::collections::BTreeSet;

use regex::Regex;

use crate::commands::is_command_only;
use crate::types::{Comment, HostUser, Review, ReviewComment};

/// Decides whether a piece of activity is ignored.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    /// The account the bot posts as.
    pub bot_user: &'a HostUser,
    pub ignored_users: &'a BTreeSet<String>,
    pub ignored_comments: &'a [Regex],
}

impl Classifier<'_> {
    pub fn ignores(&self, author: &HostUser, body: &str) -> bool {
        author == self.bot_user
            || self.ignored_users.contains(&author.username)
            || is_command_only(body)
            || self.ignored_comments.iter().any(|re| re.is_match(body))
    }

    /// Splits activity into what is mirrored, in builder order.
    pub fn classify(
        &self,
        comments: Vec<Comment>,
        reviews: Vec<Review>,
        review_comments: Vec<ReviewComment>,
    ) -> Mirrored {
        let comments = comments
            .into_iter()
            .filter(|c| !self.ignores(&c.author, &c.body))
            .collect();
        let reviews = reviews
            .into_iter()
            .filter(|r| !self.ignores(&r.reviewer, r.body.as_deref().unwrap_or("")))
            .collect();
        let mut review_comments: Vec<ReviewComment> = review_comments
            .into_iter()
            .filter(|c| !self.ignores(&c.author, &c.body))
            .collect();
        sort_review_comments(&mut review_comments);
        Mirrored {
            comments,
            reviews,
            review_comments,
        }
    }
}

/// Activity selected for mirroring.
#[derive(Debug, Clone, Default)]
pub struct Mirrored {
    pub comments: Vec<Comment>,
    pub reviews: Vec<Review>,
    /// Sorted by path, then line.
    pub review_comments: Vec<ReviewComment>,
}

/// Groups inline comments by file; stable for equal keys.
pub fn sort_review_comments(comments: &mut [ReviewComment]) {
    comments.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{comment, review_comment};

    fn bot() -> HostUser {
        HostUser::new(1, "bridge-bot", "Bridge Bot")
    }

    fn user() -> HostUser {
        HostUser::new(2, "duke", "Duke")
    }

    fn classifier<'a>(
        bot: &'a HostUser,
        ignored_users: &'a BTreeSet<String>,
        ignored_comments: &'a [Regex],
    ) -> Classifier<'a> {
        Classifier {
            bot_user: bot,
            ignored_users,
            ignored_comments,
        }
    }

    #[test]
    fn own_comments_are_ignored_even_after_rename() {
        let bot = bot();
        let users = BTreeSet::new();
        let c = classifier(&bot, &users, &[]);
        let renamed = HostUser::new(1, "renamed-bot", "Renamed");
        assert!(c.ignores(&renamed, "Mailing list message from ..."));
        assert!(!c.ignores(&user(), "Looks good"));
    }

    #[test]
    fn ignored_users_and_patterns() {
        let bot = bot();
        let users: BTreeSet<String> = ["ci".to_string()].into();
        let patterns = [Regex::new("(?m)^Build status:").unwrap()];
        let c = classifier(&bot, &users, &patterns);

        assert!(c.ignores(&HostUser::new(3, "ci", "CI"), "All green"));
        assert!(c.ignores(&user(), "Some text\nBuild status: passed"));
        assert!(!c.ignores(&user(), "The build status looks fine"));
    }

    #[test]
    fn command_only_comments_are_ignored() {
        let bot = bot();
        let users = BTreeSet::new();
        let c = classifier(&bot, &users, &[]);
        assert!(c.ignores(&user(), "/integrate\n  /sponsor"));
        assert!(!c.ignores(&user(), "/integrate\nThanks for the review!"));
        assert!(!c.ignores(&user(), ""));
    }

    #[test]
    fn review_comments_sorted_by_path_then_line() {
        let bot = bot();
        let users = BTreeSet::new();
        let c = classifier(&bot, &users, &[]);
        let inline = vec![
            review_comment(1, user(), "src/b.rs", 3),
            review_comment(2, user(), "src/a.rs", 40),
            review_comment(3, user(), "src/b.rs", 1),
            review_comment(4, user(), "src/a.rs", 7),
        ];

        let mirrored = c.classify(vec![comment(9, bot.clone(), "webrev")], vec![], inline);

        let order: Vec<u64> = mirrored.review_comments.iter().map(|c| c.id.0).collect();
        assert_eq!(order, vec![4, 2, 3, 1]);
        assert!(mirrored.comments.is_empty());
    }
}
