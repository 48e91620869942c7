/*!
# Hacker News Reader

Loads the top stories from an in-memory stories service, either one request
at a time (`bad`) or all at once (`good`), and prints how long it took.

## Example Usage

```bash
hackernews --pattern=bad --count=10
hackernews --config=config/demo
```

## Dev

To run from source:

```bash
cargo run -- --help
RUST_LOG=debug cargo run -- --pattern=good
```
*/

use async_best_practices::fire_and_forget::{self, FireAndForgetSettings};
use async_best_practices::hacker_news::{FixtureStoriesService, NewsViewModel, Story};
use async_best_practices::settings::{LoadPattern, Settings, DEFAULT_CONFIG_NAME};
use async_best_practices::Error;
use clap::{App, Arg};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{event, Level};

const FIXTURE_STORY_COUNT: usize = 100;
const FIXTURE_LATENCY: Duration = Duration::from_millis(100);

#[tokio::main]
pub async fn main() -> async_best_practices::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = App::new("Hacker News Reader")
        .about("Loads the top Hacker News stories")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .help("config file name"),
        )
        .arg(
            Arg::with_name("pattern")
                .short("p")
                .long("pattern")
                .takes_value(true)
                .possible_values(&["good", "bad"])
                .help("how to load stories"),
        )
        .arg(
            Arg::with_name("count")
                .short("n")
                .long("count")
                .takes_value(true)
                .help("number of stories to load"),
        )
        .get_matches();

    let config_name = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_NAME);
    let settings = Settings::load(config_name)?;

    let mut fire_and_forget_settings = FireAndForgetSettings::from(&settings.fire_and_forget);
    fire_and_forget_settings.set_default_exception_handling(|err| {
        event!(Level::ERROR, "background task failed: {}", err);
    });
    fire_and_forget::set_default_settings(fire_and_forget_settings);

    let pattern: LoadPattern = match matches.value_of("pattern") {
        Some(pattern) => pattern.parse()?,
        None => settings.demo.load_pattern()?,
    };
    let story_count: usize = match matches.value_of("count") {
        Some(count) => count.parse().map_err(|_| Error::Argument("count"))?,
        None => settings.demo.story_count,
    };

    let service = FixtureStoriesService::generated(FIXTURE_STORY_COUNT.max(story_count)).with_latency(FIXTURE_LATENCY);
    let view_model = NewsViewModel::new(
        Arc::new(service),
        story_count,
        pattern,
        fire_and_forget::default_settings(),
    );

    event!(Level::INFO, "loading {} stories with the {} pattern", story_count, pattern);
    let started = Instant::now();
    if let Err(err) = view_model.refresh_command().execute_async(()).await {
        eprintln!("Unable to refresh: {}", err);
        return Err(Error::Handler(err));
    }
    let elapsed = started.elapsed();

    for (rank, story) in view_model.top_stories().iter().enumerate() {
        print_story(rank + 1, story);
    }
    println!("Loaded {} stories in {:?} ({} pattern)", story_count, elapsed, pattern);

    Ok(())
}

fn print_story(rank: usize, story: &Story) {
    println!(
        "{:>3}. {} ({} points by {}, {} comments)",
        rank, story.title, story.score, story.author, story.comment_count
    );
    if let Some(url) = &story.url {
        println!("     {}", url);
    }
}
