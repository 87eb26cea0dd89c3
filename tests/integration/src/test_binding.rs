//! Placeholder binding through the public request API.

#[cfg(test)]
mod tests {
    use docstore_core::expression::{Binder, Expr, NameMap, Projection, UpdateExpr, ValueMap, bind};
    use docstore_core::prelude::*;
    use docstore_model::AttributeValue;

    use crate::{memory_client, movie, seeded_movies};

    fn maps(names: &[(&str, &str)], values: &[(&str, i64)]) -> (NameMap, ValueMap) {
        let names = names
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        let values = values
            .iter()
            .map(|(k, v)| ((*k).to_owned(), AttributeValue::from(*v)))
            .collect();
        (names, values)
    }

    #[test]
    fn test_should_bind_only_when_every_placeholder_has_an_entry() {
        let text = "#yr = :yyyy and #r > :min";
        let full = [("#yr", "year"), ("#r", "rating")];
        let full_values = [(":yyyy", 1985), (":min", 5)];

        let (names, values) = maps(&full, &full_values);
        let bound = bind::<Expr>(text, &names, &values).unwrap();
        assert_eq!(bound.names().len(), 2);
        assert_eq!(bound.values().len(), 2);

        for drop_name in 0..full.len() {
            let partial: Vec<_> = full
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != drop_name)
                .map(|(_, e)| *e)
                .collect();
            let (names, values) = maps(&partial, &full_values);
            let err = bind::<Expr>(text, &names, &values).unwrap_err();
            let BindingError::UnresolvedPlaceholder { token, .. } = err else {
                panic!("expected UnresolvedPlaceholder, got {err:?}");
            };
            assert_eq!(token, full[drop_name].0);
        }

        let (names, values) = maps(&full, &full_values[..1]);
        let err = bind::<Expr>(text, &names, &values).unwrap_err();
        assert!(matches!(
            err,
            BindingError::UnresolvedPlaceholder { ref token, .. } if token == ":min"
        ));
    }

    #[test]
    fn test_should_report_unused_entries_without_failing() {
        let (names, values) = maps(
            &[("#yr", "year"), ("#extra", "ignored")],
            &[(":yyyy", 1985), (":spare", 1)],
        );
        let mut binder = Binder::new(&names, &values).warn_unused(false);
        binder.bind::<Expr>("#yr = :yyyy").unwrap();
        binder.bind::<Projection>("#yr, title").unwrap();
        assert_eq!(binder.finish(), vec!["#extra".to_owned(), ":spare".to_owned()]);
    }

    #[test]
    fn test_should_share_maps_across_expressions_of_one_request() {
        let (names, values) = maps(&[("#r", "rating")], &[(":r", 7)]);
        let mut binder = Binder::new(&names, &values);
        let update = binder.bind::<UpdateExpr>("set info.#r = :r").unwrap();
        let condition = binder.bind::<Expr>("attribute_exists(info.#r)").unwrap();
        assert_eq!(update.names(), condition.names());
        assert!(binder.unused().is_empty());
    }

    #[test]
    fn test_should_reject_malformed_expression() {
        let (names, values) = maps(&[], &[]);
        let err = bind::<Expr>("year = = 1", &names, &values).unwrap_err();
        assert!(matches!(err, BindingError::Syntax { .. }));
    }

    #[tokio::test]
    async fn test_should_fail_request_before_any_transport_call() {
        let client = memory_client(10);
        let table = seeded_movies(&client, vec![movie(1985, "Brazil", 8.0)]).await;

        let err = table
            .query(QuerySpec::new("#yr = :yyyy").name("#yr", "year"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Binding(BindingError::UnresolvedPlaceholder { ref token, .. }) if token == ":yyyy"
        ));

        let err = table
            .query(
                QuerySpec::new("#yr = :yyyy")
                    .name("#yr", "year")
                    .value(":yyyy", "1985"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Binding(BindingError::TypeMismatch { .. })
        ));
    }
}
