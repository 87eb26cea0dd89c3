//! Filtered scans, paging and cancellation.

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use docstore_core::prelude::*;
    use docstore_model::Item;
    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;

    use crate::{memory_client, movie, seeded_movies, titles};

    fn decades() -> Vec<Item> {
        (0..12_i64)
            .map(|i| {
                let year = 1950 + i * 5;
                let rating = 5.0 + f64::from(u32::try_from(i % 5).unwrap());
                movie(year, &format!("Movie {i:02}"), rating)
            })
            .collect()
    }

    fn key_set(items: &[Item]) -> BTreeSet<(i64, String)> {
        items
            .iter()
            .map(|i| {
                (
                    i.get_int("year").unwrap(),
                    i.get_string("title").unwrap().to_owned(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_should_visit_every_item_once_across_pages() {
        let client = memory_client(5);
        let table = seeded_movies(&client, decades()).await;
        let mut iter = table.scan(ScanSpec::new()).await.unwrap();
        let mut items = Vec::new();
        while let Some(item) = iter.next().await {
            items.push(item.unwrap());
        }
        assert_eq!(items.len(), 12);
        assert_eq!(key_set(&items).len(), 12);
        assert_eq!(iter.pages_fetched(), 3);
        assert_eq!(iter.scanned_count(), 12);

        let years: Vec<i64> = items.iter().map(|i| i.get_int("year").unwrap()).collect();
        let mut sorted = years.clone();
        sorted.sort_unstable();
        assert_eq!(years, sorted);
    }

    #[tokio::test]
    async fn test_should_return_the_filtered_subset() {
        let client = memory_client(4);
        let table = seeded_movies(&client, decades()).await;
        let all = table
            .scan(ScanSpec::new())
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();

        let filtered = table
            .scan(
                ScanSpec::new()
                    .filter("#yr between :start_yr and :end_yr and info.rating >= :min")
                    .name("#yr", "year")
                    .value(":start_yr", 1960_i64)
                    .value(":end_yr", 1990_i64)
                    .value(":min", 7_i64),
            )
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();

        let expected: Vec<Item> = all
            .into_iter()
            .filter(|i| {
                let year = i.get_int("year").unwrap();
                let rating = i.get_map("info").unwrap()["rating"]
                    .as_n()
                    .unwrap()
                    .parse::<f64>()
                    .unwrap();
                (1960..=1990).contains(&year) && rating >= 7.0
            })
            .collect();
        assert!(!expected.is_empty());
        assert_eq!(titles(&filtered), titles(&expected));
    }

    #[tokio::test]
    async fn test_should_project_scan_results() {
        let client = memory_client(4);
        let table = seeded_movies(&client, decades()).await;
        let items = table
            .scan(ScanSpec::new().projection("title"))
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(items.len(), 12);
        assert!(items.iter().all(|i| i.len() == 1 && i.contains("title")));
    }

    #[tokio::test]
    async fn test_should_stop_at_page_boundary_after_cancel() {
        let client = memory_client(3);
        let table = seeded_movies(&client, decades()).await;
        let cancel = CancellationToken::new();
        let mut iter = table
            .scan_with_cancel(ScanSpec::new(), cancel.clone())
            .await
            .unwrap();

        for _ in 0..4 {
            iter.next().await.unwrap().unwrap();
        }
        assert_eq!(iter.pages_fetched(), 2);
        cancel.cancel();

        for _ in 0..2 {
            iter.next().await.unwrap().unwrap();
        }
        let err = iter.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AccessError::Cancelled { pages: 2, .. }));
        assert!(iter.next().await.is_none());
    }

    #[tokio::test]
    async fn test_should_refuse_scan_with_fired_token() {
        let client = memory_client(3);
        let table = seeded_movies(&client, decades()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = table.scan_with_cancel(ScanSpec::new(), cancel).await.unwrap_err();
        assert!(matches!(err, AccessError::Cancelled { pages: 0, .. }));
    }

    #[tokio::test]
    async fn test_should_stream_scan_results() {
        let client = memory_client(5);
        let table = seeded_movies(&client, decades()).await;
        let iter = table.scan(ScanSpec::new()).await.unwrap();
        let items: Vec<Item> = iter
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(key_set(&items).len(), 12);
    }
}
