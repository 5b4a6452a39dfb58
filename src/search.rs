//! `pix search` and `pix trend`.
//!
//! Thin CLI wrappers over the retrieval engine in [`postindex_core::search`].
//! Results print on stdout as text, or as JSON with `--json`.

use anyhow::Result;

use postindex_core::models::{MonthBucket, SearchHit};
use postindex_core::paginate::{paginate, Page};
use postindex_core::query::SearchRequest;
use postindex_core::search::{posts_per_month, search_posts};

use crate::config::Config;
use crate::elastic::ElasticBackend;

/// Longest excerpt shown per hit, in characters.
const EXCERPT_CHARS: usize = 160;
/// Width of the longest bar in `pix trend`.
const BAR_WIDTH: u64 = 40;

pub async fn run_search(
    config: &Config,
    keyword: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    page: usize,
    json: bool,
) -> Result<()> {
    let request = SearchRequest::parse(keyword, from, to)?;
    let options = config.retrieval.query_options()?;
    let backend = ElasticBackend::from_config(&config.backend)?;

    let hits = search_posts(&backend, &config.backend.index, &request, &options).await?;
    let page = paginate(&hits, config.retrieval.page_size, page);

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    print_page(&page);
    Ok(())
}

fn print_page(page: &Page<'_, SearchHit>) {
    if page.total_items == 0 {
        println!("No results.");
        return;
    }

    let first = (page.page - 1) * page.page_size;
    for (i, hit) in page.items.iter().enumerate() {
        let post = &hit.post;
        println!("{}. {}", first + i + 1, post.datetime);
        println!("    \"{}\"", excerpt(&post.content));
        for media in &post.media {
            println!("    media: {}", media.uri);
        }
        println!("    id: {}", hit.id);
        println!();
    }
    println!(
        "page {} of {} ({} results)",
        page.page, page.total_pages, page.total_items
    );
}

fn excerpt(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}

pub async fn run_trend(config: &Config, json: bool) -> Result<()> {
    let options = config.retrieval.query_options()?;
    let backend = ElasticBackend::from_config(&config.backend)?;
    let buckets = posts_per_month(&backend, &config.backend.index, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&buckets)?);
        return Ok(());
    }
    if buckets.is_empty() {
        println!("No posts.");
        return Ok(());
    }
    for line in trend_lines(&buckets) {
        println!("{}", line);
    }
    Ok(())
}

fn trend_lines(buckets: &[MonthBucket]) -> Vec<String> {
    let max = buckets.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    buckets
        .iter()
        .map(|b| {
            let width = (b.count * BAR_WIDTH).div_ceil(max) as usize;
            format!("{}  {:<w$}  {}", b.label, "#".repeat(width), b.count, w = BAR_WIDTH as usize)
        })
        .collect()
}
