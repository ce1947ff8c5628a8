#[cfg(test)]
mod tests {
    use crate::DedupStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::env;

    async fn setup_test_store() -> DedupStore {
        let db_path = env::temp_dir().join(format!("test_scout_{}.db", uuid::Uuid::new_v4()));
        DedupStore::open(&db_path)
            .await
            .expect("Failed to open test store")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_open_creates_parent_directories() {
        let dir = env::temp_dir().join(format!("scout_nested_{}", uuid::Uuid::new_v4()));
        let db_path = dir.join("data").join("pushed_posts.db");

        let store = DedupStore::open(&db_path).await.expect("Failed to open store");
        assert!(db_path.exists());
        assert_eq!(store.stats().await.unwrap().total_count, 0);

        store.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_connect_by_url() {
        let db_path = env::temp_dir().join(format!("test_scout_{}.db", uuid::Uuid::new_v4()));
        let store = DedupStore::connect(&format!("sqlite://{}", db_path.display()))
            .await
            .expect("Failed to connect");
        store.run_migrations().await.expect("Migrations must be rerunnable");
        assert_eq!(store.stats().await.unwrap().total_count, 0);
    }

    #[tokio::test]
    async fn test_contains_any_returns_seen_subset() {
        let store = setup_test_store().await;
        store.mark_seen(&ids(&["B"]), now()).await.unwrap();

        let seen = store.contains_any(&ids(&["A", "B", "C", "D"])).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("B"));

        assert!(store.contains_any(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contains_any_spans_lookup_chunks() {
        let store = setup_test_store().await;
        let many: Vec<String> = (0..1200).map(|i| format!("id{i}")).collect();
        store.mark_seen(&many[..1100], now()).await.unwrap();

        let seen = store.contains_any(&many).await.unwrap();
        assert_eq!(seen.len(), 1100);
        assert!(!seen.contains("id1150"));
    }

    #[tokio::test]
    async fn test_no_re_notification_after_mark_seen() {
        let store = setup_test_store().await;
        let batch = ids(&["A", "B", "C"]);

        let first: Vec<_> = {
            let seen = store.contains_any(&batch).await.unwrap();
            batch.iter().filter(|id| !seen.contains(*id)).cloned().collect()
        };
        assert_eq!(first, batch);
        store.mark_seen(&first, now()).await.unwrap();

        let seen = store.contains_any(&batch).await.unwrap();
        let second: Vec<_> = batch.iter().filter(|id| !seen.contains(*id)).collect();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_mark_seen_refreshes_timestamp() {
        let store = setup_test_store().await;
        let earlier = now() - Duration::days(2);

        store.mark_seen(&ids(&["A"]), earlier).await.unwrap();
        store.mark_seen(&ids(&["A"]), now()).await.unwrap();

        let record = store.get_record("A").await.unwrap().unwrap();
        assert_eq!(record.first_seen_at, now());
        assert_eq!(store.stats().await.unwrap().total_count, 1);
        assert!(store.get_record("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prune_respects_ttl() {
        let store = setup_test_store().await;
        let ttl_days = 3;

        store
            .mark_seen(&ids(&["stale"]), now() - Duration::days(ttl_days + 1))
            .await
            .unwrap();
        store
            .mark_seen(&ids(&["fresh"]), now() - Duration::days(ttl_days - 1))
            .await
            .unwrap();

        let removed = store.prune(Duration::days(ttl_days), now()).await.unwrap();
        assert_eq!(removed, 1);

        let seen = store.contains_any(&ids(&["stale", "fresh"])).await.unwrap();
        assert!(!seen.contains("stale"));
        assert!(seen.contains("fresh"));
        assert_eq!(store.stats().await.unwrap().total_count, 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_record_past_original_ttl() {
        let store = setup_test_store().await;

        store
            .mark_seen(&ids(&["A"]), now() - Duration::days(5))
            .await
            .unwrap();
        store
            .mark_seen(&ids(&["A"]), now() - Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.prune(Duration::days(3), now()).await.unwrap(), 0);
        assert!(store.contains_any(&ids(&["A"])).await.unwrap().contains("A"));
    }

    #[tokio::test]
    async fn test_prune_on_empty_store() {
        let store = setup_test_store().await;
        assert_eq!(store.prune(Duration::days(3), now()).await.unwrap(), 0);
    }
}
