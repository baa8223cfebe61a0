use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::census::Census;
use crate::config::PullRequestBotConfig;
use crate::forge::Forge;
use crate::mlbridge::update_cache::PullRequestUpdateCache;
use crate::work::{WorkError, WorkItem};
use crate::worker::Bot;

use super::command::PullRequestCommandsWorkItem;
use super::commit_comments::{CommitCommandHandler, CommitCommentsWorkItem, ProcessedSet};
use super::integration::ChangeValidator;

/// Collaborators and process-lifetime state shared by the pull request bot's
/// work items.
pub struct PullRequestContext {
    pub config: PullRequestBotConfig,
    pub forge: Arc<dyn Forge>,
    pub census: Arc<dyn Census>,
    pub validator: Arc<dyn ChangeValidator>,
    pub commit_commands: Arc<dyn CommitCommandHandler>,
    pub processed: ProcessedSet,
    pub updates: PullRequestUpdateCache,
}

/// Answers pull request commands and dispatches commit comments.
pub struct PullRequestBot {
    context: Arc<PullRequestContext>,
}

impl PullRequestBot {
    pub fn new(
        config: PullRequestBotConfig,
        forge: Arc<dyn Forge>,
        census: Arc<dyn Census>,
        validator: Arc<dyn ChangeValidator>,
        commit_commands: Arc<dyn CommitCommandHandler>,
    ) -> Self {
        PullRequestBot {
            context: Arc::new(PullRequestContext {
                config,
                forge,
                census,
                validator,
                commit_commands,
                processed: ProcessedSet::new(),
                updates: PullRequestUpdateCache::new(),
            }),
        }
    }

    pub fn context(&self) -> &Arc<PullRequestContext> {
        &self.context
    }
}

impl fmt::Display for PullRequestBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pr-bot({})", self.context.config.email)
    }
}

impl Bot for PullRequestBot {
    fn periodic_items(&self) -> Result<Vec<Box<dyn WorkItem>>, WorkError> {
        let now = Utc::now();
        let mut items: Vec<Box<dyn WorkItem>> = Vec::new();
        for repo in &self.context.config.repositories {
            for pr in self.context.forge.pull_requests(repo)? {
                if pr.state.is_open() && self.context.updates.needs_update(&pr, now) {
                    items.push(Box::new(PullRequestCommandsWorkItem::new(
                        pr,
                        Arc::clone(&self.context),
                    )));
                }
            }
            items.push(Box::new(CommitCommentsWorkItem::new(
                repo.clone(),
                Arc::clone(&self.context),
            )));
        }
        debug!(bot = %self, items = items.len(), "Polled repositories");
        Ok(items)
    }
}
