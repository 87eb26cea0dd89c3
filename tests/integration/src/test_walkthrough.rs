//! The movies walkthrough end to end.

#[cfg(test)]
mod tests {
    use docstore_core::prelude::*;
    use docstore_model::{AttributeValue, Item, ReturnValue};

    use crate::{memory_client, movies_definition, test_collection_name, titles};

    const MOVIE_DATA: &str = include_str!("../../../apps/docstore-cli/data/moviedata.json");

    fn key() -> Key {
        Key::new().with("year", 2015_i64).with("title", "X")
    }

    #[tokio::test]
    async fn test_should_run_put_get_update_get() {
        let client = memory_client(100);
        let table = client
            .create_collection(movies_definition(&test_collection_name("movies")))
            .await
            .unwrap();

        let written = Item::new()
            .with("year", 2015_i64)
            .with("title", "X")
            .with_json("info", &serde_json::json!({ "rating": 0 }));
        table.put_item(PutSpec::new(written.clone())).await.unwrap();

        let got = table.get_item(GetSpec::new(key())).await.unwrap().unwrap();
        assert_eq!(got.attributes(), written.attributes());

        let returned = table
            .update_item(
                UpdateSpec::new(key(), "set info.rating = :r")
                    .value(":r", 5.5_f64)
                    .return_values(ReturnValue::UpdatedNew),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            returned.get_map("info").unwrap()["rating"],
            AttributeValue::N("5.5".to_owned())
        );

        let got = table.get_item(GetSpec::new(key())).await.unwrap().unwrap();
        assert_eq!(
            got.get_map("info").unwrap()["rating"],
            AttributeValue::N("5.5".to_owned())
        );
        assert_eq!(got.get_int("year").unwrap(), 2015);
        assert_eq!(got.get_string("title").unwrap(), "X");
        assert_eq!(got.len(), 3);
    }

    #[tokio::test]
    async fn test_should_bulk_load_and_query_movie_data() {
        let client = memory_client(2);
        let table = client
            .create_collection(movies_definition(&test_collection_name("movies")))
            .await
            .unwrap();
        let mut source = JsonArraySource::from_json_str(MOVIE_DATA).unwrap();
        let expected = source.remaining();
        assert_eq!(bulk_load(&table, &mut source).await.unwrap(), expected);

        let description = client.describe_collection(table.name()).await.unwrap();
        assert_eq!(description.item_count, u64::try_from(expected).unwrap());

        let of_1985 = table
            .query(
                QuerySpec::new("#yr = :yyyy")
                    .name("#yr", "year")
                    .value(":yyyy", 1985_i64),
            )
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(
            titles(&of_1985),
            vec!["Back to the Future", "Brazil", "The Breakfast Club"]
        );

        let fifties = table
            .scan(
                ScanSpec::new()
                    .filter("#yr between :start_yr and :end_yr")
                    .projection("#yr, title, info.rating")
                    .name("#yr", "year")
                    .value(":start_yr", 1950_i64)
                    .value(":end_yr", 1959_i64),
            )
            .await
            .unwrap()
            .collect_items()
            .await
            .unwrap();
        assert_eq!(
            titles(&fifties),
            vec![
                "The Day the Earth Stood Still",
                "Rebel Without a Cause",
                "North by Northwest"
            ]
        );
    }

    #[tokio::test]
    async fn test_should_reject_string_timestamp_against_numeric_key() {
        let client = memory_client(10);
        let table = client
            .create_collection(movies_definition(&test_collection_name("movies")))
            .await
            .unwrap();
        let err = table
            .scan(
                ScanSpec::new()
                    .filter("#yr > :since")
                    .name("#yr", "year")
                    .value(":since", "1478246130"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Binding(BindingError::TypeMismatch { .. })
        ));
    }
}
