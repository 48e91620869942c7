//!
//! # Hacker News Reader
//!
//! A small reader model showing two ways of loading the top stories:
//!
//! - [`load_top_stories_bad`] awaits each story before asking for the next,
//!   so the total time is the sum of every request.
//! - [`load_top_stories_good`] asks for every story at once and awaits them
//!   together, so the total time is that of the slowest request.
//!
//! [`NewsViewModel`] drives a refresh through an [`AsyncCommand`] and reports
//! failed refreshes on its `pull_to_refresh_failed` event.
//!
use crate::command::AsyncCommand;
use crate::fire_and_forget::FireAndForgetSettings;
use crate::settings::LoadPattern;
use crate::weak_event_manager::WeakEventManager;
use crate::{Error, HandlerError};
use futures::future::{try_join_all, BoxFuture};
use std::any::Any;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{event, Level};

pub type FetchResult<T> = std::result::Result<T, HandlerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    pub id: u64,
    pub title: String,
    pub author: String,
    pub url: Option<String>,
    pub score: u32,
    pub comment_count: u32,
}

/// Where stories come from.
pub trait StoriesService: Send + Sync {
    /// Ids of the current top stories, best first.
    fn top_story_ids(&self) -> BoxFuture<'_, FetchResult<Vec<u64>>>;

    fn story(&self, id: u64) -> BoxFuture<'_, FetchResult<Story>>;
}

/// Load `count` top stories one request at a time.
pub async fn load_top_stories_bad(service: &dyn StoriesService, count: usize) -> FetchResult<Vec<Story>> {
    let ids = service.top_story_ids().await?;

    let mut stories = Vec::with_capacity(count.min(ids.len()));
    for id in ids.into_iter().take(count) {
        stories.push(service.story(id).await?);
    }

    sort_by_score(&mut stories);
    Ok(stories)
}

/// Load `count` top stories with all requests in flight at once.
pub async fn load_top_stories_good(service: &dyn StoriesService, count: usize) -> FetchResult<Vec<Story>> {
    let ids = service.top_story_ids().await?;

    let requests = ids.into_iter().take(count).map(|id| service.story(id));
    let mut stories = try_join_all(requests).await?;

    sort_by_score(&mut stories);
    Ok(stories)
}

fn sort_by_score(stories: &mut [Story]) {
    stories.sort_by_key(|story| Reverse(story.score));
}

/// A stories service answering from memory after a fixed delay.
pub struct FixtureStoriesService {
    stories: Vec<Story>,
    latency: Duration,
    failing: HashSet<u64>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FixtureStoriesService {
    pub fn new(stories: Vec<Story>) -> Self {
        FixtureStoriesService {
            stories,
            latency: Duration::from_millis(0),
            failing: HashSet::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// `count` made-up stories with ids starting at 1.
    pub fn generated(count: usize) -> Self {
        let stories = (1..=count as u64)
            .map(|id| Story {
                id,
                title: format!("Show HN: Project #{}", id),
                author: format!("user{}", id % 7),
                url: Some(format!("https://example.com/{}", id)),
                score: ((id * 37) % 500) as u32,
                comment_count: ((id * 13) % 120) as u32,
            })
            .collect();
        Self::new(stories)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make requests for story `id` fail.
    pub fn failing_on(mut self, id: u64) -> Self {
        self.failing.insert(id);
        self
    }

    /// The most story requests that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl StoriesService for FixtureStoriesService {
    fn top_story_ids(&self) -> BoxFuture<'_, FetchResult<Vec<u64>>> {
        Box::pin(async move { Ok(self.stories.iter().map(|story| story.id).collect()) })
    }

    fn story(&self, id: u64) -> BoxFuture<'_, FetchResult<Story>> {
        Box::pin(async move {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&id) {
                return Err(format!("request for story {} failed", id).into());
            }
            self.stories
                .iter()
                .find(|story| story.id == id)
                .cloned()
                .ok_or_else(|| format!("story {} not found", id).into())
        })
    }
}

/// The state behind a list of top stories.
pub struct NewsViewModel {
    service: Arc<dyn StoriesService>,
    pattern: LoadPattern,
    story_count: usize,
    top_stories: Mutex<Vec<Story>>,
    is_refreshing: AtomicBool,
    refresh_command: AsyncCommand<()>,
    events: WeakEventManager<String>,
}

impl NewsViewModel {
    pub fn new(
        service: Arc<dyn StoriesService>,
        story_count: usize,
        pattern: LoadPattern,
        settings: FireAndForgetSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<NewsViewModel>| {
            let refreshing = this.clone();
            let failed = this.clone();
            let refresh_command = AsyncCommand::<()>::builder(move |_| {
                let view_model = refreshing.upgrade();
                async move {
                    match view_model {
                        Some(view_model) => view_model.refresh().await,
                        None => Ok(()),
                    }
                }
            })
            .allows_multiple_executions(false)
            .on_exception(move |err| {
                if let Some(view_model) = failed.upgrade() {
                    view_model.on_refresh_failed(err);
                }
            })
            .fire_and_forget_settings(settings)
            .build();

            NewsViewModel {
                service,
                pattern,
                story_count,
                top_stories: Mutex::new(vec![]),
                is_refreshing: AtomicBool::new(false),
                refresh_command,
                events: WeakEventManager::new(),
            }
        })
    }

    crate::weak_event!(
        /// Raised with the error message when a refresh fails.
        pub fn pull_to_refresh_failed(events) -> String
    );

    pub fn refresh_command(&self) -> &AsyncCommand<()> {
        &self.refresh_command
    }

    pub fn top_stories(&self) -> Vec<Story> {
        match self.top_stories.lock() {
            Ok(stories) => stories.clone(),
            Err(_) => vec![],
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing.load(Ordering::SeqCst)
    }

    pub fn pattern(&self) -> LoadPattern {
        self.pattern
    }

    /// Reload the top stories with the configured pattern.
    pub async fn refresh(&self) -> FetchResult<()> {
        self.is_refreshing.store(true, Ordering::SeqCst);
        let started = Instant::now();

        let loaded = match self.pattern {
            LoadPattern::Bad => load_top_stories_bad(self.service.as_ref(), self.story_count).await,
            LoadPattern::Good => load_top_stories_good(self.service.as_ref(), self.story_count).await,
        };
        self.is_refreshing.store(false, Ordering::SeqCst);
        let stories = loaded?;

        event!(
            Level::INFO,
            "loaded {} stories in {:?} ({} pattern)",
            stories.len(),
            started.elapsed(),
            self.pattern
        );
        let mut top_stories = self
            .top_stories
            .lock()
            .map_err(|_| Error::LockPoisoned("top stories"))?;
        *top_stories = stories;
        Ok(())
    }

    fn on_refresh_failed(&self, err: HandlerError) {
        let message = err.to_string();
        event!(Level::WARN, "refresh failed: {}", message);
        if let Err(err) = self.pull_to_refresh_failed().raise(Some(self as &dyn Any), &message) {
            event!(Level::ERROR, "pull_to_refresh_failed handler failed: {}", err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::command::Command;
    use crate::handler::{EventHandler, HandlerMethod};
    use tokio::sync::mpsc;

    struct FailureListener {
        sender: mpsc::UnboundedSender<String>,
    }

    fn listen_for_failures(view_model: &NewsViewModel) -> (EventHandler<String>, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listener = Arc::new(FailureListener { sender });
        let handler = EventHandler::new(
            &listener,
            HandlerMethod::from_method("on_pull_to_refresh_failed", |l: &FailureListener, sender, message: &String| {
                assert!(sender.map_or(false, |s| s.is::<NewsViewModel>()));
                l.sender.send(message.clone())?;
                Ok(())
            }),
        );
        view_model.pull_to_refresh_failed().add(&handler).unwrap();
        (handler, receiver)
    }

    #[tokio::test]
    async fn both_patterns_load_the_same_stories_test() {
        let service = FixtureStoriesService::generated(30);

        let bad = load_top_stories_bad(&service, 10).await.unwrap();
        let good = load_top_stories_good(&service, 10).await.unwrap();

        assert_eq!(bad.len(), 10);
        assert_eq!(bad, good);
        assert!(good.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert!(good.iter().all(|story| story.id <= 10));
    }

    #[tokio::test]
    async fn good_pattern_runs_requests_concurrently_test() {
        let bad_service = FixtureStoriesService::generated(8).with_latency(Duration::from_millis(5));
        let good_service = FixtureStoriesService::generated(8).with_latency(Duration::from_millis(5));

        load_top_stories_bad(&bad_service, 8).await.unwrap();
        load_top_stories_good(&good_service, 8).await.unwrap();

        assert_eq!(bad_service.max_in_flight(), 1);
        assert_eq!(good_service.max_in_flight(), 8);
    }

    #[tokio::test]
    async fn failed_request_fails_the_load_test() {
        let service = FixtureStoriesService::generated(5).failing_on(3);

        let err = load_top_stories_good(&service, 5).await.unwrap_err();
        assert_eq!(err.to_string(), "request for story 3 failed");

        // the failing story is past the requested count
        let stories = load_top_stories_bad(&service, 2).await.unwrap();
        assert_eq!(stories.len(), 2);
    }

    #[tokio::test]
    async fn refresh_command_loads_stories_test() {
        let service = Arc::new(FixtureStoriesService::generated(12));
        let view_model = NewsViewModel::new(service, 5, LoadPattern::Good, FireAndForgetSettings::new());

        view_model.refresh_command().execute_async(()).await.unwrap();

        let stories = view_model.top_stories();
        assert_eq!(stories.len(), 5);
        assert!(!view_model.is_refreshing());
        assert!(view_model.refresh_command().can_execute(None).unwrap());
    }

    #[tokio::test]
    async fn failed_refresh_raises_pull_to_refresh_failed_test() {
        let service = Arc::new(FixtureStoriesService::generated(4).failing_on(2));
        let view_model = NewsViewModel::new(service, 4, LoadPattern::Bad, FireAndForgetSettings::new());
        let (_handler, mut failures) = listen_for_failures(&view_model);

        view_model.refresh_command().execute(None).unwrap();

        assert_eq!(failures.recv().await.unwrap(), "request for story 2 failed");
        assert!(view_model.top_stories().is_empty());
    }

    #[tokio::test]
    async fn dropped_listener_is_not_notified_test() {
        let service = Arc::new(FixtureStoriesService::generated(2).failing_on(1));
        let view_model = NewsViewModel::new(service, 2, LoadPattern::Good, FireAndForgetSettings::new());
        let (handler, mut failures) = listen_for_failures(&view_model);
        drop(handler);

        let err = view_model.refresh().await.unwrap_err();
        view_model.on_refresh_failed(err);

        // the listener owned the only sender
        assert!(failures.recv().await.is_none());
        assert_eq!(view_model.pull_to_refresh_failed().subscription_count(), 0);
    }
}
