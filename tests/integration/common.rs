//! Shared fixtures: mock site pages and fast test configurations

use gallery_harvest::config::Config;
use gallery_harvest::crawler::{FetchSettings, Fetcher, HeaderProfile, StageContext};
use gallery_harvest::storage::{CollectionRecord, SqliteStorage, Storage};
use gallery_harvest::url::{ImageUrlTemplate, SiteUrls};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

/// Configuration pointing at the mock server with all delays removed
pub fn test_config(server: &MockServer, dir: &Path) -> Config {
    let mut config = Config::with_base_url(&server.uri());
    config.site.terminal_tag = String::new();
    config.fetch.jitter_min_ms = 0;
    config.fetch.jitter_max_ms = 0;
    config.fetch.retry_cooldown_secs = 0;
    config.download.root = dir.join("downloads");
    config.download.image_delay_min_ms = 0;
    config.download.image_delay_max_ms = 0;
    config.storage.database_path = dir.join("harvest.db").display().to_string();
    config
}

/// Fetch policy with no jitter and millisecond cooldowns
pub fn fast_settings(server: &MockServer) -> FetchSettings {
    let site = SiteUrls::new(&server.uri(), "zhuanti/").unwrap();
    FetchSettings {
        max_retries: 3,
        retry_cooldown: Duration::from_millis(10),
        rate_limit_retries: 5,
        connection_limit: 5,
        timeout: Duration::from_secs(10),
        connect_timeout: Duration::from_secs(5),
        jitter_min: Duration::ZERO,
        jitter_max: Duration::ZERO,
        chunk_size: 1024,
        host: site.authority(),
        referer: site.base().to_string(),
    }
}

pub fn open_store(dir: &Path) -> Arc<SqliteStorage> {
    Arc::new(SqliteStorage::new(&dir.join("harvest.db")).unwrap())
}

/// Stage context for the downloader, backed by `storage`
pub fn image_context(server: &MockServer, storage: Arc<dyn Storage>) -> StageContext {
    StageContext {
        fetcher: Fetcher::new(fast_settings(server))
            .unwrap()
            .with_profile(HeaderProfile::Image),
        storage,
        site: Arc::new(SiteUrls::new(&server.uri(), "zhuanti/").unwrap()),
        cancel: CancellationToken::new(),
    }
}

/// A stored collection whose images live under `/img/2020/09/27a..` on the mock server
pub fn stored_collection(
    storage: &dyn Storage,
    server: &MockServer,
    identifier: &str,
    name: &str,
    image_count: u32,
) -> CollectionRecord {
    let record = CollectionRecord {
        identifier: identifier.to_string(),
        name: name.to_string(),
        image_count,
        template: ImageUrlTemplate {
            prefix: format!("{}/img/2020/09/27a", server.uri()),
            suffix: ".jpg".to_string(),
            index_width: 2,
        },
        date: None,
        tag_names: vec![],
    };

    let identifiers: BTreeSet<String> = [identifier.to_string()].into_iter().collect();
    storage.insert_new(&identifiers).unwrap();
    storage.save_metadata(&record).unwrap();
    record
}

pub fn tag_index_page(tags: &[&str]) -> String {
    let links: String = tags
        .iter()
        .map(|tag| format!(r#"<dd><a href="/tag/{}/">{}</a></dd>"#, tag, tag))
        .collect();
    format!(
        r#"<html><body><dl class="tags"><dt>All</dt>{}</dl></body></html>"#,
        links
    )
}

/// First page of a tag; only its pager matters
pub fn tag_first_page(tag: &str, pages: u32) -> String {
    format!(
        r#"<html><body><div class="nav-links">
             <a href="/tag/{tag}/page/{pages}/">{pages}</a>
             <a href="/tag/{tag}/page/2/">next</a>
           </div></body></html>"#,
        tag = tag,
        pages = pages
    )
}

pub fn listing_page(identifiers: &[&str]) -> String {
    let items: String = identifiers
        .iter()
        .map(|id| format!(r#"<li><a href="/{id}"><img></a><span><a href="/{id}">title</a></span></li>"#, id = id))
        .collect();
    format!(r#"<html><body><ul id="pins">{}</ul></body></html>"#, items)
}

pub fn collection_page(name: &str, image_count: u32, first_image: &str) -> String {
    format!(
        r##"<html><body>
             <h2 class="main-title">{name}</h2>
             <div class="main-tags"><a href="/tag/a/">a</a></div>
             <div class="main-image"><p><a href="#"><img src="{first_image}"></a></p></div>
             <div class="pagenavi">
               <a href="#"><span>1</span></a>
               <a href="#"><span>{count}</span></a>
               <a href="#"><span>next</span></a>
             </div>
           </body></html>"##,
        name = name,
        first_image = first_image,
        count = image_count
    )
}
