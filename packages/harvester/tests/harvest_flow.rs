//! End-to-end harvest runs against a mock site graph.

use harvester::harvest::SiteStatus;
use harvester::testing::{CollectingSink, MockFetcher};
use harvester::{
    DedupStore, FileDedupStore, HarvestError, HarvestJob, HarvestSettings, Harvester, ItemCaps,
    JournalSink, LimitOverrides, MemoryStore, RateLimiter, SiteCrawler, SourceCatalog,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const STORY: &str = "Gunmen kidnapped two aid workers on the road to Mirebalais, police said.";

fn settings(data_dir: &Path) -> HarvestSettings {
    let vars = HashMap::from([
        ("DATA_DIR".to_string(), data_dir.display().to_string()),
        ("SCRAPE_MIN_LEN".to_string(), "20".to_string()),
    ]);
    HarvestSettings::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn haiti_site() -> MockFetcher {
    MockFetcher::new()
        .with_site_page(
            "https://news.ht/",
            STORY,
            ["https://news.ht/a", "https://news.ht/b", "https://elsewhere.org/x"],
        )
        .with_site_page("https://news.ht/a", STORY, ["https://news.ht/"])
        .with_site_page("https://news.ht/b", STORY, Vec::<String>::new())
}

fn write_sources(path: &Path, json: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, json).unwrap();
}

#[tokio::test]
async fn test_journal_run_and_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    write_sources(&settings.sources_path(), r#"{"Haiti": ["https://news.ht/"]}"#);

    let build = |dedup: FileDedupStore| {
        let crawler = SiteCrawler::new(haiti_site(), dedup, RateLimiter::new());
        Harvester::new(crawler, JournalSink::new(&settings.data_dir), SourceCatalog::default())
            .with_sources_file(settings.sources_path())
            .with_defaults(settings.limits)
            .with_caps(settings.caps)
    };

    let harvester = build(FileDedupStore::open(settings.seen_path()).await.unwrap());
    let report = harvester
        .run(&HarvestJob::new("haiti"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.limits.min_length, 20);
    let day_files: Vec<_> = std::fs::read_dir(dir.path().join("haiti")).unwrap().collect();
    assert_eq!(day_files.len(), 1);
    drop(harvester);

    // A fresh process sees the flushed URLs.
    let harvester = build(FileDedupStore::open(settings.seen_path()).await.unwrap());
    assert_eq!(harvester.dedup().len(), 3);
    let report = harvester
        .run(&HarvestJob::new("all"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(report.countries[0].sites[0].status, SiteStatus::Ok);
}

#[tokio::test]
async fn test_missing_sources_file_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let crawler = SiteCrawler::new(
        haiti_site(),
        Arc::new(MemoryStore::new()),
        RateLimiter::new(),
    );
    let harvester = Harvester::new(crawler, CollectingSink::new(), SourceCatalog::default())
        .with_sources_file(dir.path().join("web_sources.json"));

    let result = harvester
        .run(&HarvestJob::new("all"), CancellationToken::new())
        .await;
    assert!(matches!(result, Err(HarvestError::Config(_))));
}

#[tokio::test]
async fn test_job_overrides_win_over_environment() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let catalog = SourceCatalog::from_map([("haiti", vec!["https://news.ht/".to_string()])]);
    let crawler = SiteCrawler::new(
        haiti_site(),
        Arc::new(MemoryStore::new()),
        RateLimiter::new(),
    );
    let harvester = Harvester::new(crawler, CollectingSink::new(), catalog)
        .with_defaults(settings.limits);

    let overrides = LimitOverrides::from_json(r#"{"max_pages": 1, "min_len": "bogus"}"#).unwrap();
    let report = harvester
        .run(
            &HarvestJob::new("haiti").with_overrides(overrides),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(report.limits.min_length, 20);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(harvester.sink().accepted().len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_are_serialized() {
    let catalog = SourceCatalog::from_map([("haiti", vec!["https://news.ht/".to_string()])]);
    let dedup = Arc::new(MemoryStore::new());
    let crawler = SiteCrawler::new(haiti_site(), dedup, RateLimiter::new());
    let harvester = Arc::new(Harvester::new(crawler, CollectingSink::new(), catalog));

    let job = HarvestJob::new("haiti");
    let (a, b) = tokio::join!(
        harvester.run(&job, CancellationToken::new()),
        harvester.run(&job, CancellationToken::new()),
    );

    // Whichever ran second found everything already seen.
    let mut totals = [a.unwrap().total, b.unwrap().total];
    totals.sort();
    assert_eq!(totals, [0, 3]);
}

#[tokio::test]
async fn test_capped_pages_are_collected_by_a_later_run() {
    let dedup = Arc::new(MemoryStore::new());
    let build = |per_domain: Option<usize>| {
        let catalog = SourceCatalog::from_map([("haiti", vec!["https://news.ht/".to_string()])]);
        let crawler = SiteCrawler::new(haiti_site(), dedup.clone(), RateLimiter::new());
        Harvester::new(crawler, CollectingSink::new(), catalog).with_caps(ItemCaps {
            per_country: None,
            per_domain,
        })
    };

    let capped = build(Some(1));
    let first = capped
        .run(&HarvestJob::new("haiti"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.total, 1);

    let uncapped = build(None);
    let second = uncapped
        .run(&HarvestJob::new("haiti"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.total, 2);
    let mut delivered: Vec<String> = capped
        .sink()
        .accepted()
        .into_iter()
        .chain(uncapped.sink().accepted())
        .map(|(_, page)| page.url)
        .collect();
    delivered.sort();
    assert_eq!(
        delivered,
        ["https://news.ht/", "https://news.ht/a", "https://news.ht/b"]
    );
}

#[tokio::test]
async fn test_country_cap_leaves_remaining_pages_for_later() {
    let dedup = Arc::new(MemoryStore::new());
    let build = |per_country: Option<usize>| {
        let catalog = SourceCatalog::from_map([("haiti", vec!["https://news.ht/".to_string()])]);
        let crawler = SiteCrawler::new(haiti_site(), dedup.clone(), RateLimiter::new());
        Harvester::new(crawler, CollectingSink::new(), catalog).with_caps(ItemCaps {
            per_country,
            per_domain: None,
        })
    };

    let first = build(Some(2))
        .run(&HarvestJob::new("haiti"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(dedup.len(), 2);

    let second = build(Some(2))
        .run(&HarvestJob::new("haiti"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.total, 1);
}
