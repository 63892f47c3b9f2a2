use anyhow::Result;
use clap::Args;
use tracing::info;

use feedmerge_core::{Aggregator, AppConfig, MergedItem};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Extra feed URL to include (repeatable)
    #[arg(short, long = "feed", value_name = "URL")]
    pub feeds: Vec<String>,

    /// Items kept per feed
    #[arg(short = 'n', long)]
    pub items: Option<usize>,

    /// Seconds a cached feed stays fresh
    #[arg(long, value_name = "SECS")]
    pub cache_time: Option<u64>,

    /// Print the merged list as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(mut config: AppConfig, args: RunArgs) -> Result<()> {
    config.aggregator.feeds.extend(args.feeds);
    if let Some(items) = args.items {
        config.aggregator.items_per_feed = items;
    }
    if let Some(secs) = args.cache_time {
        config.aggregator.cache_time_secs = secs;
    }

    if config.aggregator.feeds.is_empty() {
        println!("No feeds configured.");
        println!("\nAdd feeds to {} or run:", AppConfig::config_path().display());
        println!("  feedmerge run --feed <url>");
        return Ok(());
    }

    let aggregator = Aggregator::from_config(&config)?;
    info!(
        "Aggregating {} feeds (cache: {})",
        aggregator.feeds().len(),
        config.cache_dir().display()
    );
    let items = aggregator.run_configured().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items found.");
        return Ok(());
    }

    println!(
        "{} items from {} feeds:\n",
        items.len(),
        aggregator.feeds().len()
    );
    for item in &items {
        print_item(item);
    }

    Ok(())
}

fn print_item(merged: &MergedItem) {
    let item = &merged.item;
    let title = if item.title.is_empty() {
        "(no title)"
    } else {
        item.title.as_str()
    };

    println!(
        "  {} [{}] {}",
        item.published_at.format("%Y-%m-%d %H:%M"),
        item.source,
        title
    );
    if !item.link.is_empty() {
        println!("    {}", item.link);
    }
    if let Some(thumbnail) = &item.thumbnail {
        println!("    Thumbnail: {}", thumbnail);
    }
    println!();
}
