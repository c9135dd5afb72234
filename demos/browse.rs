use catalog_browse::{ControllerConfig, ControllerEvent, RowImage, SearchController};
use clap::Parser;
use std::collections::BTreeSet;
use std::time::Duration;

/// Search the software catalog and download artwork for the first rows
#[derive(Parser)]
#[command(name = "browse", long_about = None)]
struct Cli {
    /// Search term; the configured placeholder query is used when omitted
    query: Option<String>,

    /// Number of rows to request artwork for
    #[arg(long, default_value = "5")]
    rows: usize,

    /// Seconds to wait for artwork downloads
    #[arg(long, default_value = "10")]
    wait: u64,

    /// Simulate a memory warning after the downloads finish
    #[arg(long)]
    memory_pressure: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Cli::parse();

    let config = ControllerConfig::from_env();
    let http_client = http_client::native::NativeClient::new();
    let controller = SearchController::with_http_client(Box::new(http_client), config);
    let mut events = controller.subscribe();

    match &args.query {
        Some(query) => controller.clear_and_research(query).await?,
        None => controller.refresh().await?,
    };

    let requested = args.rows.min(controller.len());
    println!(
        "{} results for {:?}",
        controller.len(),
        controller.last_query().unwrap_or_default()
    );

    for index in 0..requested {
        if let Some(row) = controller.row(index) {
            println!("{:>3}. {}", index + 1, row.title);
        }
    }

    let mut pending: BTreeSet<usize> = (0..requested).collect();
    let deadline = tokio::time::sleep(Duration::from_secs(args.wait));
    tokio::pin!(deadline);

    while !pending.is_empty() {
        tokio::select! {
            _ = &mut deadline => {
                println!("Gave up waiting on rows {pending:?}");
                break;
            }
            event = events.recv() => match event? {
                ControllerEvent::RowUpdated { index, .. } => {
                    pending.remove(&index);
                    if let Some(row) = controller.row(index) {
                        if let RowImage::Cached(artwork) = row.image {
                            println!(
                                "     artwork for row {}: {:?} {}x{} ({} bytes)",
                                index + 1,
                                artwork.format,
                                artwork.width,
                                artwork.height,
                                artwork.len()
                            );
                        }
                    }
                }
                ControllerEvent::ArtworkFailed { index, error, .. } => {
                    pending.remove(&index);
                    println!("     artwork for row {} failed: {error}", index + 1);
                }
                _ => {}
            }
        }
    }

    let stats = controller.cache_stats();
    println!(
        "Cache: {} entries, {} hits, {} misses",
        controller.cached_artwork_count(),
        stats.hits,
        stats.misses
    );

    if args.memory_pressure {
        controller.on_memory_pressure();
        println!(
            "After memory warning: {} cached, {} results kept",
            controller.cached_artwork_count(),
            controller.len()
        );
    }

    Ok(())
}
