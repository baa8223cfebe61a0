use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::census::Census;
use crate::config::BridgeConfig;
use crate::email::MailingList;
use crate::forge::Forge;
use crate::work::{WorkError, WorkItem};
use crate::worker::Bot;

use super::update_cache::PullRequestUpdateCache;
use super::webrev::{LinkWebrevGenerator, WebrevGenerator};
use super::work_item::ArchiveWorkItem;

/// Collaborators shared by the bridge bot and its work items.
pub struct BridgeContext {
    pub config: BridgeConfig,
    pub forge: Arc<dyn Forge>,
    pub census: Arc<dyn Census>,
    /// The real mailing list new mails are relayed to.
    pub list: Arc<dyn MailingList>,
    pub webrevs: Arc<dyn WebrevGenerator>,
    pub updates: PullRequestUpdateCache,
}

/// Mirrors pull request reviews to mailing lists through the archive.
pub struct MailingListBridgeBot {
    context: Arc<BridgeContext>,
}

impl MailingListBridgeBot {
    pub fn new(
        config: BridgeConfig,
        forge: Arc<dyn Forge>,
        census: Arc<dyn Census>,
        list: Arc<dyn MailingList>,
        webrevs: Arc<dyn WebrevGenerator>,
    ) -> Self {
        MailingListBridgeBot {
            context: Arc::new(BridgeContext {
                config,
                forge,
                census,
                list,
                webrevs,
                updates: PullRequestUpdateCache::new(),
            }),
        }
    }

    /// A bot whose webrev links point at `config.webrev_base_url`, or at the
    /// forge's own file view when no base URL is configured.
    pub fn from_config(
        config: BridgeConfig,
        forge: Arc<dyn Forge>,
        census: Arc<dyn Census>,
        list: Arc<dyn MailingList>,
    ) -> Self {
        let webrevs = Arc::new(LinkWebrevGenerator::new(config.webrev_base_url.clone()));
        Self::new(config, forge, census, list, webrevs)
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.context
    }
}

impl fmt::Display for MailingListBridgeBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mlbridge({})", self.context.config.archive.url)
    }
}

impl Bot for MailingListBridgeBot {
    fn periodic_items(&self) -> Result<Vec<Box<dyn WorkItem>>, WorkError> {
        let now = Utc::now();
        let mut items: Vec<Box<dyn WorkItem>> = Vec::new();
        for repo in &self.context.config.repositories {
            for pr in self.context.forge.pull_requests(repo)? {
                if self.context.updates.needs_update(&pr, now) {
                    items.push(Box::new(ArchiveWorkItem::new(pr, Arc::clone(&self.context))));
                }
            }
        }
        debug!(bot = %self, items = items.len(), "Polled pull requests");
        Ok(items)
    }
}
