use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yaolist_blob::config;
use yaolist_blob::{Bucket, Cursor, ListOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yaolist_blob=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("yaolist-blob {} (built {})", env!("CARGO_PKG_VERSION"), env!("BUILD_TIME"));

    // Load configuration / 加载配置
    let app_config = config::load_config().map_err(anyhow::Error::msg)?;

    // Keep the temp dir alive until the bucket is closed / 临时目录需在关闭前保持存在
    let temp_dir;
    let url = if app_config.uses_temp_bucket() {
        temp_dir = tempfile::Builder::new().prefix("yaolist-blob-").tempdir()?;
        format!("file://{}", temp_dir.path().display())
    } else {
        app_config.bucket.url.clone()
    };

    let bucket = Bucket::open(&url).with_context(|| format!("Failed to open bucket {}", url))?;
    tracing::info!("Using bucket {} ({})", url, bucket.driver_name());

    for key in &app_config.demo.keys {
        bucket
            .write_all(key, app_config.demo.value.clone().into_bytes(), None)
            .await
            .with_context(|| format!("Failed to write {}", key))?;
    }

    let options = ListOptions::new().delimiter(&app_config.bucket.delimiter);

    // Recursive listing / 递归列举
    println!("Tree:");
    let mut walker = bucket.walk(options.clone());
    while let Some(item) = walker.next().await {
        let item = item?;
        let name = &item.entry.key;
        if item.entry.is_prefix {
            println!("{}{}", "  ".repeat(item.depth), name);
        } else {
            println!("{}{} ({} bytes)", "  ".repeat(item.depth), name, item.entry.size);
        }
    }

    // Paginated listing with shrinking page sizes / 逐步缩小分页大小
    for page_size in (1..=app_config.demo.max_page_size.max(1)).rev() {
        println!("Page size {}:", page_size);
        let mut cursor = Cursor::Start;
        let mut page_no = 0;
        loop {
            let (entries, next) = bucket.list_page(&cursor, page_size, &options).await?;
            page_no += 1;
            let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
            println!("  page {}: {:?}", page_no, keys);
            if next.is_end() {
                break;
            }
            cursor = next;
        }
    }

    bucket.close().await?;
    Ok(())
}
