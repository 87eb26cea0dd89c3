//! Key-condition queries.

#[cfg(test)]
mod tests {
    use docstore_core::prelude::*;
    use docstore_model::Item;

    use crate::{memory_client, movie, seeded_movies, titles};

    fn catalogue() -> Vec<Item> {
        vec![
            movie(1992, "Unforgiven", 8.3),
            movie(1992, "A Few Good Men", 7.7),
            movie(1992, "Reservoir Dogs", 8.4),
            movie(1992, "Aladdin", 8.0),
            movie(1992, "Glengarry Glen Ross", 7.8),
            movie(1993, "Jurassic Park", 8.2),
            movie(1991, "Hook", 6.8),
        ]
    }

    fn year_query(year: i64) -> QuerySpec {
        QuerySpec::new("#yr = :yyyy")
            .name("#yr", "year")
            .value(":yyyy", year)
    }

    #[tokio::test]
    async fn test_should_return_exactly_the_partition_in_sort_order() {
        let client = memory_client(2);
        let table = seeded_movies(&client, catalogue()).await;
        let iter = table.query(year_query(1992)).await.unwrap();
        let items = iter.collect_items().await.unwrap();
        assert_eq!(
            titles(&items),
            vec![
                "A Few Good Men",
                "Aladdin",
                "Glengarry Glen Ross",
                "Reservoir Dogs",
                "Unforgiven"
            ]
        );
        assert!(items.iter().all(|i| i.get_int("year").unwrap() == 1992));
    }

    #[tokio::test]
    async fn test_should_reverse_order_when_scanning_backward() {
        let client = memory_client(3);
        let table = seeded_movies(&client, catalogue()).await;
        let items = table
            .query(year_query(1992).scan_forward(false))
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(titles(&items).first().map(String::as_str), Some("Unforgiven"));
        assert_eq!(titles(&items).last().map(String::as_str), Some("A Few Good Men"));
    }

    #[tokio::test]
    async fn test_should_bound_sort_key_inclusively_with_between() {
        let client = memory_client(10);
        let table = seeded_movies(&client, catalogue()).await;
        let items = table
            .query(
                QuerySpec::new("#yr = :yyyy and title between :letter1 and :letter2")
                    .name("#yr", "year")
                    .value(":yyyy", 1992_i64)
                    .value(":letter1", "Aladdin")
                    .value(":letter2", "Reservoir Dogs"),
            )
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(
            titles(&items),
            vec!["Aladdin", "Glengarry Glen Ross", "Reservoir Dogs"]
        );
    }

    #[tokio::test]
    async fn test_should_match_sort_key_prefix() {
        let client = memory_client(10);
        let table = seeded_movies(&client, catalogue()).await;
        let items = table
            .query(
                QuerySpec::new("#yr = :yyyy and begins_with(title, :prefix)")
                    .name("#yr", "year")
                    .value(":yyyy", 1992_i64)
                    .value(":prefix", "A"),
            )
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(titles(&items), vec!["A Few Good Men", "Aladdin"]);
    }

    #[tokio::test]
    async fn test_should_filter_after_key_condition() {
        let client = memory_client(2);
        let table = seeded_movies(&client, catalogue()).await;
        let mut iter = table
            .query(
                year_query(1992)
                    .filter("info.rating >= :min")
                    .value(":min", 8_i64),
            )
            .await
            .unwrap();
        let mut found = Vec::new();
        while let Some(item) = iter.next().await {
            found.push(item.unwrap());
        }
        assert_eq!(
            titles(&found),
            vec!["Aladdin", "Reservoir Dogs", "Unforgiven"]
        );
        assert_eq!(iter.scanned_count(), 5);
    }

    #[tokio::test]
    async fn test_should_project_nested_paths() {
        let client = memory_client(10);
        let table = seeded_movies(&client, catalogue()).await;
        let items = table
            .query(
                QuerySpec::new("#yr = :yyyy and title between :letter1 and :letter2")
                    .projection("#yr, title, info.genres, info.actors[0]")
                    .name("#yr", "year")
                    .value(":yyyy", 1992_i64)
                    .value(":letter1", "A")
                    .value(":letter2", "L"),
            )
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        for item in &items {
            assert_eq!(item.len(), 3);
            let info = item.get_map("info").unwrap();
            assert!(!info.contains_key("rating"));
            let actors = info["actors"].as_l().unwrap();
            assert_eq!(actors.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_should_return_nothing_for_empty_partition() {
        let client = memory_client(10);
        let table = seeded_movies(&client, catalogue()).await;
        let mut iter = table.query(year_query(2001)).await.unwrap();
        assert!(iter.next().await.is_none());
        assert_eq!(iter.pages_fetched(), 1);
    }

    #[tokio::test]
    async fn test_should_reject_key_conditions_the_store_cannot_serve() {
        let client = memory_client(10);
        let table = seeded_movies(&client, catalogue()).await;
        let rejected = [
            QuerySpec::new("title = :t").value(":t", "Hook"),
            QuerySpec::new("#yr > :yyyy")
                .name("#yr", "year")
                .value(":yyyy", 1990_i64),
            QuerySpec::new("#yr = :yyyy or title = :t")
                .name("#yr", "year")
                .value(":yyyy", 1992_i64)
                .value(":t", "Hook"),
            QuerySpec::new("#yr = :yyyy and info.rating > :r")
                .name("#yr", "year")
                .value(":yyyy", 1992_i64)
                .value(":r", 5_i64),
        ];
        for spec in rejected {
            let err = table.query(spec).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    AccessError::Validation(ValidationError::InvalidKeyCondition { .. })
                ),
                "unexpected error: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_should_reject_zero_page_size() {
        let client = memory_client(10);
        let table = seeded_movies(&client, catalogue()).await;
        let err = table.query(year_query(1992).page_size(0)).await.unwrap_err();
        assert!(matches!(
            err,
            AccessError::Validation(ValidationError::InvalidPageSize { .. })
        ));
    }
}
