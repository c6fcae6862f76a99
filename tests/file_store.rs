// tests/file_store.rs
use chrono::{TimeZone, Utc};
use subscription_poller::{
    content_hash, ConfigMetadata, ConfigRepository, JsonFileStore, StatsTracker, StoreError,
    YieldRate, YieldRateRepository,
};

#[tokio::test]
async fn config_overwrite_replaces_previous_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();
    let at = Utc.with_ymd_and_hms(2025, 9, 6, 8, 0, 0).unwrap();

    let url = "https://sub.example/prod";
    assert!(store.get_config(url).await.unwrap().is_none());

    store
        .store_config(&ConfigMetadata::new(url, b"vmess://one".to_vec(), at))
        .await
        .unwrap();
    store
        .store_config(&ConfigMetadata::new(url, b"vmess://two".to_vec(), at))
        .await
        .unwrap();

    let got = store.get_config(url).await.unwrap().unwrap();
    assert_eq!(got.content(), b"vmess://two");
    assert_eq!(got.content_hash(), content_hash(b"vmess://two"));
    assert_eq!(got.last_updated, at);
    assert!(got.valid);

    // no temp files left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("configs"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let at = Utc.with_ymd_and_hms(2025, 9, 6, 8, 0, 0).unwrap();
    {
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        store
            .store_config(&ConfigMetadata::new("https://a", vec![0xff, 0x00, 0x7f], at))
            .await
            .unwrap();
        store
            .store_yield_rate("vless", &YieldRate { yielded: 3, total: 4 })
            .await
            .unwrap();
    }
    let store = JsonFileStore::open(dir.path()).await.unwrap();
    let cfg = store.get_config("https://a").await.unwrap().unwrap();
    assert_eq!(cfg.content(), &[0xff, 0x00, 0x7f]);
    assert_eq!(
        store.get_yield_rate("vless").await.unwrap(),
        Some(YieldRate { yielded: 3, total: 4 })
    );
    assert_eq!(store.get_yield_rate("vmess").await.unwrap(), None);
}

#[tokio::test]
async fn corrupt_record_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();
    store
        .store_yield_rate("trojan", &YieldRate { yielded: 1, total: 1 })
        .await
        .unwrap();
    for entry in std::fs::read_dir(dir.path().join("yield_rates")).unwrap() {
        std::fs::write(entry.unwrap().path(), b"{ not json").unwrap();
    }
    assert!(matches!(
        store.get_yield_rate("trojan").await,
        Err(StoreError::Corrupt { .. })
    ));
}

#[tokio::test]
async fn stats_tracker_round_trips_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();

    let stats = StatsTracker::new();
    stats.record_validation("https://a", true);
    stats.record_validation("https://a", false);
    stats.record_validation("vless", true);
    stats.persist_to(&store).await.unwrap();

    let keys = vec!["https://a".to_string(), "vless".to_string(), "ss".to_string()];
    let restored = StatsTracker::load_from(&store, &keys).await.unwrap();
    assert_eq!(restored.get_yield_rate("https://a"), YieldRate { yielded: 1, total: 2 });
    assert_eq!(restored.get_validity_rate("vless"), 1.0);
    assert!(restored.get_yield_rate("ss").is_unknown());
}
