#[cfg(feature = "mock")]
mod mock_tests {
    use catalog_browse::{
        Artwork, CatalogClient, CatalogError, ControllerConfig, ControllerEvent, MockCatalogClient,
        ResultItem, Result, SearchController,
    };
    use mockall::predicate::*;
    use std::sync::Arc;

    fn artwork(url: &str) -> Artwork {
        Artwork {
            url: url.to_string(),
            bytes: bytes::Bytes::from_static(b"\x89PNG"),
            format: image::ImageFormat::Png,
            width: 100,
            height: 100,
            fetched_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mock_search() -> Result<()> {
        let mut mock_client = MockCatalogClient::new();

        mock_client
            .expect_search()
            .with(eq("books"))
            .times(1)
            .returning(|_| Ok(vec![ResultItem::new("Kindle", "https://art.test/k.png")]));

        let client: &dyn CatalogClient = &mock_client;
        let items = client.search("books").await?;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].track_name, "Kindle");

        Ok(())
    }

    #[tokio::test]
    async fn test_controller_over_mock() -> Result<()> {
        let mut mock_client = MockCatalogClient::new();

        mock_client
            .expect_search()
            .with(eq("books"))
            .times(1)
            .returning(|_| {
                Ok(vec![
                    ResultItem::new("Kindle", "https://art.test/k.png"),
                    ResultItem::new("Audible", "https://art.test/a.png"),
                ])
            });
        mock_client
            .expect_fetch_artwork()
            .with(eq("https://art.test/a.png"))
            .times(1)
            .returning(|url| Ok(artwork(url)));

        let controller = SearchController::new(Arc::new(mock_client), ControllerConfig::default());
        let mut events = controller.subscribe();

        controller.search("books").await?;
        assert!(controller.row(1).unwrap().image.is_placeholder());

        loop {
            if let ControllerEvent::RowUpdated { index, .. } = events.recv().await.unwrap() {
                assert_eq!(index, 1);
                break;
            }
        }

        let row = controller.row(1).unwrap();
        assert_eq!(row.title, "Audible");
        assert_eq!(row.image.artwork().unwrap().width, 100);

        Ok(())
    }

    #[tokio::test]
    async fn test_mock_rate_limit_keeps_list_empty() {
        let mut mock_client = MockCatalogClient::new();

        mock_client
            .expect_search()
            .returning(|_| Err(CatalogError::RateLimit { retry_after: 30 }));

        let controller = SearchController::new(Arc::new(mock_client), ControllerConfig::default());
        let err = controller.refresh().await.unwrap_err();

        assert_eq!(err, CatalogError::RateLimit { retry_after: 30 });
        assert!(controller.is_empty());
        assert_eq!(controller.last_query().as_deref(), Some("books"));
    }
}
