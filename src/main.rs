use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use media_feed::bucket::WellKnownBuckets;
use media_feed::cache::service::{CacheInvalidation, CacheService};
use media_feed::config::{default_config_path, FeedConfig};
use media_feed::media::scanner::scan_folder_async;
use media_feed::media::thumbnail::ThumbnailCaches;
use media_feed::state::data::MediaBucket;
use media_feed::state::library::{MediaStore, SqliteStore};
use media_feed::{
    BatchOperation, BatchReport, BucketId, ConsumerState, LocalMediaSource, MediaFeed, SharedFeed,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Keep a media feed in sync with a local media store
#[derive(Debug, Parser)]
#[command(name = "media-feed", version, about)]
struct Cli {
    /// Config file (JSON)
    #[arg(long, env = "MEDIA_FEED_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import every media file under a folder into the store
    Scan { folder: PathBuf },
    /// Print the media sets of the feed
    List,
    /// Rotate every item of a bucket
    Rotate {
        #[arg(allow_hyphen_values = true)]
        bucket: i32,
        /// Angle in degrees, negative turns counter-clockwise
        #[arg(allow_hyphen_values = true)]
        degrees: f32,
    },
    /// Delete a whole bucket from the store
    Delete {
        #[arg(allow_hyphen_values = true)]
        bucket: i32,
    },
    /// Keep the feed loaded and reconcile it as the store changes
    Watch {
        /// Folder to rescan periodically
        #[arg(long)]
        scan: Option<PathBuf>,
        /// Seconds between rescans
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

/// Everything a command needs, opened from the config
struct App {
    config: FeedConfig,
    store: Arc<SqliteStore>,
    cache: Arc<CacheService>,
    source: LocalMediaSource,
    feed: SharedFeed,
    consumer_state: watch::Sender<ConsumerState>,
}

impl App {
    fn open(config: FeedConfig) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteStore::open(&config.database_path).context("Failed to open the media store")?,
        );
        let cache = Arc::new(
            CacheService::open(store.clone(), &config.cache_dir)
                .context("Failed to open the cache")?,
        );
        let thumbnails = ThumbnailCaches::open(&config.cache_dir)?;
        let known = WellKnownBuckets::from_root(&config.storage_root);
        let (consumer_state, state_rx) = watch::channel(ConsumerState::Active);

        let mut source = LocalMediaSource::new(
            store.clone(),
            cache.clone(),
            thumbnails,
            known,
            state_rx,
            Handle::current(),
        )
        .with_rotate_consistency(config.rotate_consistency);
        source.set_mime_filter(config.disable_images, config.disable_videos);

        Ok(Self {
            config,
            store,
            cache,
            source,
            feed: MediaFeed::new().shared(),
            consumer_state,
        })
    }

    fn print_feed(&self) {
        let feed = self.feed.lock();
        if feed.is_empty() {
            println!("No media sets.");
            return;
        }
        for set in feed.sets() {
            println!("{:>12}  {:<32}  {}", set.id, set.title, set.subtitle);
        }
    }

    /// Load a set and all of its items
    fn load_bucket(&mut self, bucket: BucketId) -> anyhow::Result<MediaBucket> {
        self.source.load_media_sets(&self.feed)?;
        let expected = match self.feed.lock().get(bucket) {
            Some(set) => set.num_expected_items,
            None => bail!("No media set with bucket id {}", bucket),
        };
        self.source.load_items_for_set(&self.feed, bucket, 0..expected)?;
        let items = self
            .feed
            .lock()
            .get(bucket)
            .map(|set| set.items().to_vec())
            .unwrap_or_default();
        Ok(MediaBucket::with_items(bucket, items))
    }
}

fn print_report(report: &BatchReport) {
    if report.deleted_rows > 0 {
        println!("🗑️  Deleted {} rows", report.deleted_rows);
    }
    if report.rotated_items > 0 {
        println!("🔄 Rotated {} items", report.rotated_items);
    }
    for failure in &report.failures {
        println!(
            "⚠️  {} ({:?}): {}",
            failure.content_uri, failure.stage, failure.reason
        );
    }
}

async fn run_watch(app: &mut App, scan: Option<PathBuf>, interval: u64) -> anyhow::Result<()> {
    app.source.load_media_sets(&app.feed)?;
    // Nobody looks at the feed interactively here, reconcile right away
    app.consumer_state.send_replace(ConsumerState::Paused);
    app.print_feed();

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if let Some(folder) = &scan {
                    let store: Arc<dyn MediaStore> = app.store.clone();
                    match scan_folder_async(store, folder.clone()).await {
                        Ok(report) if report.imported_count > 0 => {
                            info!("✅ Imported {} new files", report.imported_count)
                        }
                        Ok(_) => {}
                        Err(e) => warn!("⚠️  Rescan failed: {}", e),
                    }
                }
                // Give the listeners a moment to reconcile what the scan produced
                tokio::time::sleep(Duration::from_millis(200)).await;
                let changed = app.feed.lock().take_needs_refresh();
                if changed {
                    app.print_feed();
                }
            }
        }
    }

    info!("👋 Stopping");
    app.source.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.config.or_else(default_config_path) {
        Some(path) => FeedConfig::load(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => FeedConfig::default(),
    };
    let mut app = App::open(config)?;

    match cli.command {
        Command::Scan { folder } => {
            let store: Arc<dyn MediaStore> = app.store.clone();
            let report = scan_folder_async(store, folder).await?;
            // New buckets are unknown to the cache index
            app.cache.mark_dirty();
            println!(
                "✅ Imported {} files ({} skipped)",
                report.imported_count, report.skipped_count
            );
        }
        Command::List => {
            app.source.load_media_sets(&app.feed)?;
            app.print_feed();
            info!(
                "Camera bucket is {}, download bucket is {} (storage root {})",
                app.source.known().camera,
                app.source.known().download,
                app.config.storage_root.display()
            );
        }
        Command::Rotate { bucket, degrees } => {
            let mut buckets = [app.load_bucket(BucketId(bucket))?];
            let report = app.source.perform_operation(
                &app.feed,
                BatchOperation::Rotate { degrees },
                &mut buckets,
            )?;
            print_report(&report);
        }
        Command::Delete { bucket } => {
            let mut buckets = [MediaBucket::whole(BucketId(bucket))];
            let report =
                app.source
                    .perform_operation(&app.feed, BatchOperation::Delete, &mut buckets)?;
            print_report(&report);
        }
        Command::Watch { scan, interval } => run_watch(&mut app, scan, interval).await?,
    }

    app.source.stop();
    Ok(())
}
