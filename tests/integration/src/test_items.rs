//! Single-item reads and writes.

#[cfg(test)]
mod tests {
    use docstore_core::prelude::*;
    use docstore_model::{AttributeValue, Item, ReturnValue};

    use crate::{memory_client, movie, seeded_movies, titles};

    fn key(year: i64, title: &str) -> Key {
        Key::new().with("year", year).with("title", title)
    }

    #[tokio::test]
    async fn test_should_get_back_what_was_put() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![]).await;
        let item = movie(2013, "Rush", 8.3)
            .with("tags", AttributeValue::Ss(vec!["f1".into(), "racing".into()]))
            .with("released", true)
            .with("sequel", AttributeValue::Null(true));
        table.put_item(PutSpec::new(item.clone())).await.unwrap();

        let got = table
            .get_item(GetSpec::new(key(2013, "Rush")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.attributes(), item.attributes());
        assert!(got.get_bool("released").unwrap());
        assert!(got.is_null("sequel"));
    }

    #[tokio::test]
    async fn test_should_replace_whole_item_on_second_put() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![movie(2013, "Rush", 8.3)]).await;
        let old = table
            .put_item(
                PutSpec::new(Item::new().with("year", 2013_i64).with("title", "Rush"))
                    .return_values(ReturnValue::AllOld),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(old.contains("info"));

        let got = table
            .get_item(GetSpec::new(key(2013, "Rush")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn test_should_leave_unnamed_attributes_untouched_by_set() {
        let client = memory_client(10);
        let table =
            seeded_movies(&client, vec![movie(2013, "Rush", 8.3).with("rank", 12_i64)]).await;
        let before = table
            .get_item(GetSpec::new(key(2013, "Rush")))
            .await
            .unwrap()
            .unwrap();

        table
            .update_item(
                UpdateSpec::new(key(2013, "Rush"), "set info.rating = :r, seen = :s")
                    .value(":r", 9_i64)
                    .value(":s", true),
            )
            .await
            .unwrap();

        let after = table
            .get_item(GetSpec::new(key(2013, "Rush")))
            .await
            .unwrap()
            .unwrap();
        let info = after.get_map("info").unwrap();
        assert_eq!(info["rating"], AttributeValue::from(9_i64));
        let before_info = before.get_map("info").unwrap();
        assert_eq!(info["genres"], before_info["genres"]);
        assert_eq!(info["actors"], before_info["actors"]);
        assert_eq!(after.get("rank"), before.get("rank"));
        assert_eq!(after.get("year"), before.get("year"));
        assert!(after.get_bool("seen").unwrap());
        assert_eq!(after.len(), before.len() + 1);
    }

    #[tokio::test]
    async fn test_should_create_item_when_updating_missing_key() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![]).await;
        let created = table
            .update_item(
                UpdateSpec::new(key(2020, "Tenet"), "set rating = :r")
                    .value(":r", 7_i64)
                    .return_values(ReturnValue::AllNew),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.get_int("year").unwrap(), 2020);
        assert_eq!(created.get_string("title").unwrap(), "Tenet");
        assert_eq!(created.get_int("rating").unwrap(), 7);
    }

    #[tokio::test]
    async fn test_should_reject_update_of_key_attribute() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![movie(2013, "Rush", 8.3)]).await;
        let err = table
            .update_item(
                UpdateSpec::new(key(2013, "Rush"), "set title = :t").value(":t", "Rush 2"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Validation(ValidationError::KeyAttributeUpdate { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_keep_item_when_condition_fails() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![movie(2013, "Rush", 8.3)]).await;
        let err = table
            .update_item(
                UpdateSpec::new(key(2013, "Rush"), "set info.rating = :r")
                    .condition("info.rating > :min")
                    .value(":r", 1_i64)
                    .value(":min", 9_i64),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::ConditionalCheckFailed { .. }));

        let got = table
            .get_item(GetSpec::new(key(2013, "Rush")).projection("info.rating"))
            .await
            .unwrap()
            .unwrap();
        let rating = got.get_map("info").unwrap()["rating"].clone();
        assert_eq!(rating, AttributeValue::N("8.3".to_owned()));
    }

    #[tokio::test]
    async fn test_should_return_none_for_missing_item() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![]).await;
        assert!(
            table
                .get_item(GetSpec::new(key(1999, "Nothing")))
                .await
                .unwrap()
                .is_none()
        );
    }

    fn wide_key(year: &str) -> Key {
        Key::new()
            .with("year", AttributeValue::N(year.to_owned()))
            .with("title", "X")
    }

    #[tokio::test]
    async fn test_should_keep_keys_differing_beyond_f64_precision_apart() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![]).await;
        for (year, tag) in [("9007199254740993", "first"), ("9007199254740992", "second")] {
            let item = Item::new()
                .with("year", AttributeValue::N(year.to_owned()))
                .with("title", "X")
                .with("tag", tag);
            table.put_item(PutSpec::new(item)).await.unwrap();
        }

        let got = table
            .get_item(GetSpec::new(wide_key("9007199254740993")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            got.attributes()["year"],
            AttributeValue::N("9007199254740993".to_owned())
        );
        assert_eq!(got.get_string("tag").unwrap(), "first");

        let all = table
            .scan(ScanSpec::new())
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let tags: Vec<String> = all
            .iter()
            .map(|i| i.get_string("tag").unwrap().to_owned())
            .collect();
        assert_eq!(tags, ["second", "first"]);
    }

    #[tokio::test]
    async fn test_should_filter_large_numbers_exactly() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![]).await;
        for (title, views) in [("A", "9007199254740992"), ("B", "9007199254740993")] {
            let item = Item::new()
                .with("year", 2000_i64)
                .with("title", title)
                .with("views", AttributeValue::N(views.to_owned()));
            table.put_item(PutSpec::new(item)).await.unwrap();
        }

        let found = table
            .scan(
                ScanSpec::new()
                    .filter("views = :v")
                    .value(":v", AttributeValue::N("9007199254740993".to_owned())),
            )
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(titles(&found), ["B"]);
    }

    #[tokio::test]
    async fn test_should_reject_non_numeric_number_key() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![]).await;
        let err = table
            .put_item(PutSpec::new(
                Item::new()
                    .with("year", AttributeValue::N("abc".to_owned()))
                    .with("title", "X"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Validation(ValidationError::InvalidNumber { ref attribute, .. })
                if attribute == "year"
        ));

        let err = table
            .get_item(GetSpec::new(wide_key("12abc")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Validation(ValidationError::InvalidNumber { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_remove_list_elements_named_by_original_position() {
        let client = memory_client(10);
        let item = Item::new()
            .with("year", 2013_i64)
            .with("title", "Rush")
            .with(
                "actors",
                AttributeValue::L(vec!["a".into(), "b".into(), "c".into()]),
            );
        let table = seeded_movies(&client, vec![item]).await;

        let updated = table
            .update_item(
                UpdateSpec::new(key(2013, "Rush"), "remove actors[0], actors[1]")
                    .return_values(ReturnValue::AllNew),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get_list("actors").unwrap(), &[AttributeValue::from("c")]);
    }
}
