//! Shared fixtures and in-memory collaborators for tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, SubsecRound, TimeZone, Utc};
use parking_lot::Mutex;
use regex::Regex;

use crate::census::{Census, Contributor, ProjectRole};
use crate::config::{BridgeConfig, MailingListRule, PullRequestBotConfig};
use crate::email::{
    Conversation, Email, EmailAddress, EmailId, MailResult, MailingList, thread_messages,
};
use crate::forge::{Forge, ForgeError, ForgeResult};
use crate::git::{CommitIdentity, GitRepository, RemoteRef, Repository, run_git_sync};
use crate::pr::{ChangeValidator, CommitCommandHandler};
use crate::types::{
    Branch, Comment, CommentId, CommitComment, HostUser, PrNumber, PrState, PullRequest, RepoId,
    Review, ReviewComment, Sha, Verdict,
};
use crate::work::{WorkError, WorkIdentity, WorkItem, WorkKind, WorkOutcome, WorkSubject};

// ─── Tracing ───

/// Installs a test-friendly subscriber once. `RUST_LOG` overrides the level.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ─── Forge data ───

fn jdk() -> RepoId {
    RepoId::new("openjdk", "jdk")
}

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// An open pull request on `openjdk/jdk` by `duke`.
pub fn pull_request(n: u64) -> PullRequest {
    PullRequest {
        repo: jdk(),
        number: PrNumber(n),
        title: format!("{}: Fix the frobnicator", 8_000_000 + n),
        body: "The frobnicator was not frobnicating.".into(),
        author: HostUser::new(100, "duke", "Duke Java"),
        state: PrState::Open,
        labels: BTreeSet::new(),
        head_sha: Sha::new("1".repeat(40)),
        head_ref: format!("refs/pull/{}/head", n),
        target_ref: "master".into(),
        target_sha: Sha::new("2".repeat(40)),
        web_url: format!("https://git.example.org/openjdk/jdk/pull/{}", n),
        updated_at: fixed_time(),
    }
}

pub fn comment(id: u64, author: HostUser, body: &str) -> Comment {
    Comment {
        id: CommentId(id),
        author,
        body: body.into(),
        created_at: Utc::now(),
    }
}

pub fn review(id: u64, reviewer: HostUser, verdict: Verdict, body: Option<&str>) -> Review {
    Review {
        id: CommentId(id),
        reviewer,
        verdict,
        body: body.map(str::to_string),
        hash: Sha::new("1".repeat(40)),
        created_at: Utc::now(),
    }
}

pub fn review_comment(id: u64, author: HostUser, path: &str, line: u32) -> ReviewComment {
    ReviewComment {
        id: CommentId(id),
        author,
        path: path.into(),
        line,
        body: format!("Comment on {}:{}", path, line),
        hash: Sha::new("1".repeat(40)),
        created_at: Utc::now(),
    }
}

// ─── Mail ───

/// A message with id `<local@example.org>`, optionally replying to `parent`.
pub fn email(local: &str, parent: Option<&str>) -> Email {
    Email {
        id: EmailId::new(local, "example.org"),
        date: Utc::now().trunc_subsecs(0),
        author: EmailAddress::new("Duke Java", "duke@example.org"),
        sender: EmailAddress::new("Bridge Bot", "bridge@example.org"),
        recipients: vec![EmailAddress::bare("dev@example.org")],
        subject: format!("Message {}", local),
        body: format!("Body of {}.", local),
        in_reply_to: parent.map(|p| EmailId::new(p, "example.org")),
        headers: BTreeMap::new(),
    }
}

/// Records posted messages in memory.
#[derive(Default)]
pub struct FakeMailingList {
    posted: Mutex<Vec<Email>>,
}

impl FakeMailingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posted(&self) -> Vec<Email> {
        self.posted.lock().clone()
    }
}

impl MailingList for FakeMailingList {
    fn post(&self, email: &Email) -> MailResult<()> {
        self.posted.lock().push(email.clone());
        Ok(())
    }

    fn conversations(&self, max_age: Duration) -> MailResult<Vec<Conversation>> {
        let cutoff = Utc::now() - max_age;
        Ok(thread_messages(self.posted())
            .into_iter()
            .filter(|c| c.first().date >= cutoff)
            .collect())
    }
}

// ─── Configuration ───

pub fn bridge_config() -> BridgeConfig {
    BridgeConfig {
        email: EmailAddress::new("Bridge Bot", "bridge@openjdk.org"),
        archive: RemoteRef::new("/nonexistent/archive.git", "master"),
        repositories: vec![jdk()],
        lists: vec![MailingListRule {
            address: EmailAddress::bare("dev@openjdk.org"),
            labels: BTreeSet::new(),
        }],
        ignored_users: BTreeSet::new(),
        ignored_comments: Vec::new(),
        ready_labels: BTreeSet::new(),
        ready_comments: BTreeMap::new(),
        headers: BTreeMap::new(),
        cooldown: Duration::zero(),
        repo_in_subject: false,
        branch_in_subject: Regex::new("^(?:a^)$").unwrap(),
        webrev_base_url: None,
    }
}

pub fn pr_bot_config() -> PullRequestBotConfig {
    PullRequestBotConfig {
        email: EmailAddress::new("PR Bot", "pr-bot@openjdk.org"),
        repositories: vec![jdk()],
    }
}

// ─── Census ───

/// Census with domain `openjdk.org` and namespace `github.com`.
#[derive(Default)]
pub struct FakeCensus {
    by_account: HashMap<u64, Contributor>,
    roles: HashMap<String, ProjectRole>,
}

impl FakeCensus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contributor(
        mut self,
        account: HostUser,
        username: &str,
        full_name: Option<&str>,
        role: ProjectRole,
    ) -> Self {
        self.by_account.insert(
            account.id,
            Contributor {
                username: username.into(),
                full_name: full_name.map(str::to_string),
            },
        );
        self.roles.insert(username.into(), role);
        self
    }
}

impl Census for FakeCensus {
    fn contributor(&self, user: &HostUser) -> Option<Contributor> {
        self.by_account.get(&user.id).cloned()
    }

    fn role(&self, username: &str) -> ProjectRole {
        self.roles.get(username).copied().unwrap_or(ProjectRole::None)
    }

    fn domain(&self) -> &str {
        "openjdk.org"
    }

    fn namespace(&self) -> &str {
        "github.com"
    }
}

// ─── Forge ───

type PrKey = (RepoId, PrNumber);

#[derive(Default)]
struct ForgeState {
    pull_requests: Vec<PullRequest>,
    comments: HashMap<PrKey, Vec<Comment>>,
    reviews: HashMap<PrKey, Vec<Review>>,
    review_comments: HashMap<PrKey, Vec<ReviewComment>>,
    commit_comments: HashMap<RepoId, Vec<CommitComment>>,
    branches: HashMap<RepoId, Vec<Branch>>,
    urls: HashMap<RepoId, String>,
    comment_failures: Vec<u16>,
}

impl ForgeState {
    fn pull_request_mut(&mut self, repo: &RepoId, number: PrNumber) -> ForgeResult<&mut PullRequest> {
        self.pull_requests
            .iter_mut()
            .find(|pr| &pr.repo == repo && pr.number == number)
            .ok_or_else(|| ForgeError::from_status(404, format!("no pull request {}{}", repo, number)))
    }
}

fn key(pr: &PullRequest) -> PrKey {
    (pr.repo.clone(), pr.number)
}

/// In-memory forge. The bot account is `bridge-bot` (id 1000).
///
/// Mutations through the [`Forge`] trait leave `updated_at` alone; use
/// [`FakeForge::touch`] to simulate activity the update cache should notice.
pub struct FakeForge {
    bot: HostUser,
    state: Mutex<ForgeState>,
    next_id: AtomicU64,
    mutations: AtomicUsize,
}

impl Default for FakeForge {
    fn default() -> Self {
        FakeForge {
            bot: HostUser::new(1000, "bridge-bot", "Bridge Bot"),
            state: Mutex::new(ForgeState::default()),
            next_id: AtomicU64::new(5000),
            mutations: AtomicUsize::new(0),
        }
    }
}

impl FakeForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bot_user(&self) -> HostUser {
        self.bot.clone()
    }

    pub fn add_pull_request(&self, pr: PullRequest) {
        self.state.lock().pull_requests.push(pr);
    }

    /// Current snapshot of pull request `number` on `openjdk/jdk`.
    pub fn pull_request(&self, number: PrNumber) -> PullRequest {
        self.state
            .lock()
            .pull_request_mut(&jdk(), number)
            .map(|pr| pr.clone())
            .unwrap()
    }

    pub fn update_pull_request(&self, number: PrNumber, update: impl FnOnce(&mut PullRequest)) {
        let mut state = self.state.lock();
        update(state.pull_request_mut(&jdk(), number).unwrap());
    }

    /// Bumps `updated_at` by one second.
    pub fn touch(&self, number: PrNumber) {
        self.update_pull_request(number, |pr| pr.updated_at += Duration::seconds(1));
    }

    pub fn add_label_to(&self, number: PrNumber, label: &str) {
        self.update_pull_request(number, |pr| {
            pr.labels.insert(label.into());
        });
    }

    pub fn comment_as(&self, pr: &PullRequest, author: &HostUser, body: &str) -> Comment {
        let posted = comment(self.next_id.fetch_add(1, Ordering::SeqCst), author.clone(), body);
        self.state
            .lock()
            .comments
            .entry(key(pr))
            .or_default()
            .push(posted.clone());
        posted
    }

    pub fn comments_on(&self, pr: &PullRequest) -> Vec<Comment> {
        self.state
            .lock()
            .comments
            .get(&key(pr))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of mutating calls made through the [`Forge`] trait.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn set_repository_url(&self, repo: &RepoId, url: &str) {
        self.state.lock().urls.insert(repo.clone(), url.into());
    }

    pub fn set_branches(&self, repo: &RepoId, branches: Vec<Branch>) {
        self.state.lock().branches.insert(repo.clone(), branches);
    }

    pub fn add_commit_comment(&self, repo: &RepoId, comment: CommitComment) {
        self.state
            .lock()
            .commit_comments
            .entry(repo.clone())
            .or_default()
            .push(comment);
    }

    /// The next call to [`Forge::comments`] fails with HTTP `status`.
    pub fn fail_next_comments(&self, status: u16) {
        self.state.lock().comment_failures.push(status);
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl Forge for FakeForge {
    fn current_user(&self) -> ForgeResult<HostUser> {
        Ok(self.bot.clone())
    }

    fn pull_requests(&self, repo: &RepoId) -> ForgeResult<Vec<PullRequest>> {
        Ok(self
            .state
            .lock()
            .pull_requests
            .iter()
            .filter(|pr| &pr.repo == repo)
            .cloned()
            .collect())
    }

    fn comments(&self, pr: &PullRequest) -> ForgeResult<Vec<Comment>> {
        if let Some(status) = self.state.lock().comment_failures.pop() {
            return Err(ForgeError::from_status(status, "scripted forge failure"));
        }
        Ok(self.comments_on(pr))
    }

    fn reviews(&self, pr: &PullRequest) -> ForgeResult<Vec<Review>> {
        Ok(self.state.lock().reviews.get(&key(pr)).cloned().unwrap_or_default())
    }

    fn review_comments(&self, pr: &PullRequest) -> ForgeResult<Vec<ReviewComment>> {
        Ok(self
            .state
            .lock()
            .review_comments
            .get(&key(pr))
            .cloned()
            .unwrap_or_default())
    }

    fn add_comment(&self, pr: &PullRequest, body: &str) -> ForgeResult<Comment> {
        self.mutated();
        Ok(self.comment_as(pr, &self.bot, body))
    }

    fn update_comment(&self, pr: &PullRequest, id: CommentId, body: &str) -> ForgeResult<Comment> {
        self.mutated();
        let mut state = self.state.lock();
        let existing = state
            .comments
            .get_mut(&key(pr))
            .and_then(|comments| comments.iter_mut().find(|c| c.id == id))
            .ok_or_else(|| ForgeError::from_status(404, format!("no comment {}", id)))?;
        existing.body = body.into();
        Ok(existing.clone())
    }

    fn set_state(&self, pr: &PullRequest, state: PrState) -> ForgeResult<()> {
        self.mutated();
        self.state.lock().pull_request_mut(&pr.repo, pr.number)?.state = state;
        Ok(())
    }

    fn add_label(&self, pr: &PullRequest, label: &str) -> ForgeResult<()> {
        self.mutated();
        self.state
            .lock()
            .pull_request_mut(&pr.repo, pr.number)?
            .labels
            .insert(label.into());
        Ok(())
    }

    fn remove_label(&self, pr: &PullRequest, label: &str) -> ForgeResult<()> {
        self.mutated();
        self.state
            .lock()
            .pull_request_mut(&pr.repo, pr.number)?
            .labels
            .remove(label);
        Ok(())
    }

    fn recent_commit_comments(&self, repo: &RepoId) -> ForgeResult<Vec<CommitComment>> {
        Ok(self.state.lock().commit_comments.get(repo).cloned().unwrap_or_default())
    }

    fn branches(&self, repo: &RepoId) -> ForgeResult<Vec<Branch>> {
        Ok(self.state.lock().branches.get(repo).cloned().unwrap_or_default())
    }

    fn repository_url(&self, repo: &RepoId) -> ForgeResult<String> {
        self.state
            .lock()
            .urls
            .get(repo)
            .cloned()
            .ok_or_else(|| ForgeError::from_status(404, format!("unknown repository {}", repo)))
    }
}

// ─── Pull request bot collaborators ───

/// Passes every change unless told otherwise.
#[derive(Default)]
pub struct FakeValidator {
    violations: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, violations: Vec<String>) {
        *self.violations.lock() = violations;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChangeValidator for FakeValidator {
    fn validate(
        &self,
        _repo: &GitRepository,
        _commit: &Sha,
        _pr: &PullRequest,
    ) -> Result<Vec<String>, WorkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.violations.lock().clone())
    }
}

/// Records handled commit comments; can fail once on request.
#[derive(Default)]
pub struct FakeCommitHandler {
    fail_next: AtomicBool,
    handled: Mutex<Vec<CommentId>>,
}

impl FakeCommitHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn handled(&self) -> Vec<CommentId> {
        self.handled.lock().clone()
    }
}

impl CommitCommandHandler for FakeCommitHandler {
    fn handle(&self, _repo: &RepoId, comment: &CommitComment, _scratch: &Path) -> Result<(), WorkError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(WorkError::Io(std::io::Error::other("handler unavailable")));
        }
        self.handled.lock().push(comment.id);
        Ok(())
    }
}

// ─── Git ───

pub fn bot_identity() -> CommitIdentity {
    CommitIdentity::new("Bridge Bot", "bridge@openjdk.org")
}

/// Creates a bare repository at `base/<name>.git` whose default branch is
/// `master`, optionally seeded with a README commit.
pub fn bare_remote(base: &Path, name: &str, with_initial_commit: bool) -> RemoteRef {
    let path = base.join(format!("{}.git", name));
    std::fs::create_dir_all(&path).unwrap();
    run_git_sync(&path, &["init", "--bare", "--quiet"]).unwrap();
    run_git_sync(&path, &["symbolic-ref", "HEAD", "refs/heads/master"]).unwrap();
    let remote = RemoteRef::new(path.to_string_lossy(), "master");

    if with_initial_commit {
        let seed = GitRepository::init(&base.join(format!("{}-seed", name))).unwrap();
        std::fs::write(seed.root().join("README"), "# Test\n").unwrap();
        seed.add_all().unwrap();
        let id = bot_identity();
        let head = seed.commit("Initial commit", &id, &id).unwrap();
        seed.push(&head, &remote.url, &remote.refname()).unwrap();
    }
    remote
}

static WORKDIRS: AtomicUsize = AtomicUsize::new(0);

/// Commits `file` with `contents` on top of the remote's branch and pushes the
/// result to `refname`.
pub fn commit_to_remote(
    base: &Path,
    remote: &RemoteRef,
    refname: &str,
    file: &str,
    contents: &str,
) -> Sha {
    let n = WORKDIRS.fetch_add(1, Ordering::SeqCst);
    let repo = GitRepository::materialize(&base.join(format!("work-{}", n)), remote).unwrap();
    std::fs::write(repo.root().join(file), contents).unwrap();
    repo.add_all().unwrap();
    let id = bot_identity();
    let head = repo.commit(&format!("Update {}", file), &id, &id).unwrap();
    repo.push(&head, &remote.url, refname).unwrap();
    head
}

// ─── Work items ───

/// Tracks how many gauged items run at once.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }
}

struct GaugeGuard<'a>(&'a ConcurrencyGauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What happened to a [`ScriptedItem`] after it was handed to the runner.
#[derive(Debug, Default)]
pub struct Probe {
    runs: AtomicUsize,
    failures: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl Probe {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// A work item whose behavior is set up by the test.
///
/// Pull request kinds operate on `openjdk/jdk` #n; commit comment kinds on
/// comment n of the same repository.
pub struct ScriptedItem {
    kind: WorkKind,
    n: u64,
    behavior: Behavior,
    delay: Option<StdDuration>,
    retry_at: Option<DateTime<Utc>>,
    gauge: Option<Arc<ConcurrencyGauge>>,
    follow_up: Mutex<Option<Box<ScriptedItem>>>,
    probe: Arc<Probe>,
}

impl ScriptedItem {
    pub fn new(kind: WorkKind, n: u64) -> Self {
        ScriptedItem {
            kind,
            n,
            behavior: Behavior::Succeed,
            delay: None,
            retry_at: None,
            gauge: None,
            follow_up: Mutex::new(None),
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.behavior = Behavior::Fail;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behavior = Behavior::Panic;
        self
    }

    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_retry_at(mut self, at: DateTime<Utc>) -> Self {
        self.retry_at = Some(at);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn with_follow_up(self, follow_up: ScriptedItem) -> Self {
        *self.follow_up.lock() = Some(Box::new(follow_up));
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }
}

impl fmt::Display for ScriptedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scripted {:?} #{}", self.kind, self.n)
    }
}

impl WorkItem for ScriptedItem {
    fn identity(&self) -> WorkIdentity {
        let subject = match self.kind {
            WorkKind::Archive | WorkKind::PullRequestCommands => WorkSubject::PullRequest {
                repo: jdk(),
                pr: PrNumber(self.n),
            },
            WorkKind::CommitComments => {
                WorkSubject::Repository(RepoId::new("openjdk", format!("repo{}", self.n)))
            }
            WorkKind::CommitCommand => WorkSubject::CommitComment {
                repo: jdk(),
                id: CommentId(self.n),
            },
        };
        WorkIdentity::new(self.kind, subject)
    }

    fn run(&self, _scratch: &Path) -> Result<WorkOutcome, WorkError> {
        self.probe.runs.fetch_add(1, Ordering::SeqCst);
        let _guard = self.gauge.as_deref().map(|g| g.enter());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.behavior {
            Behavior::Succeed => {}
            Behavior::Fail => {
                return Err(WorkError::Io(std::io::Error::other("scripted failure")));
            }
            Behavior::Panic => panic!("scripted panic"),
        }

        let mut outcome = match self.follow_up.lock().take() {
            Some(next) => WorkOutcome::with_follow_ups(vec![next as Box<dyn WorkItem>]),
            None => WorkOutcome::done(),
        };
        outcome.retry_at = self.retry_at;
        Ok(outcome)
    }

    fn handle_failure(&self, error: &WorkError) {
        self.probe.failures.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_error.lock() = Some(error.to_string());
    }
}
