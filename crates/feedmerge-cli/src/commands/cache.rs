use anyhow::Result;

use feedmerge_core::{
    cache::{cache_key, FileCache},
    AppConfig,
};

pub fn key(config: &AppConfig, url: &str) -> Result<()> {
    let key = cache_key(url);

    println!("Key:  {}", key);
    println!("Path: {}", config.cache_dir().join(&key).display());

    Ok(())
}

pub async fn clean(config: &AppConfig) -> Result<()> {
    let cache = FileCache::new(config.cache_dir())?;
    println!("Cleaning cache at {}...", cache.root().display());

    let removed = cache.clear().await?;
    tracing::info!("Removed {} cache entries", removed);

    if removed > 0 {
        println!("Deleted {} cached feeds.", removed);
    } else {
        println!("Cache is already empty.");
    }

    Ok(())
}
