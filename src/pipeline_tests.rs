//! Tests for the scrape pipeline orchestration
//!
//! Exercises the pipeline against scripted session and extractor doubles:
//! the close-exactly-once guarantee, the empty-on-failure boundary, and the
//! end-to-end fetch/reduce/extract flow.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::browser::SessionError;
    use crate::config::Config;
    use crate::listings::{ListingItem, ListingResponse};
    use crate::openai::ExtractionError;
    use crate::pipeline::{ListingExtractor, MarkupSource, Pipeline};

    fn test_config() -> Config {
        Config {
            openai_api_key: None,
            model: "gpt-4o-mini-2024-07-18".to_string(),
            listings_base_url: "https://www.fincaraiz.com.co/arriendo/apartamentos".to_string(),
            ready_selector: "div.title".to_string(),
            container_selector: "section.listingsWrapper".to_string(),
            selector_timeout_ms: 7_000,
            render_grace_ms: 3_000,
            truncate_limit: 100_000,
            openai_timeout_secs: 120,
            sse_host: "127.0.0.1".to_string(),
            sse_port: 8000,
            chrome_path: None,
            headless: true,
        }
    }

    fn item(title: &str) -> ListingItem {
        ListingItem {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    /// What the scripted session does on fetch
    enum SessionScript {
        Markup(String),
        FailStart,
        FailNavigation,
    }

    struct FakeSession {
        script: SessionScript,
        fetched_urls: Arc<Mutex<Vec<String>>>,
        close_calls: Arc<AtomicUsize>,
    }

    impl FakeSession {
        fn new(script: SessionScript) -> (Self, Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>) {
            let fetched_urls = Arc::new(Mutex::new(Vec::new()));
            let close_calls = Arc::new(AtomicUsize::new(0));
            let session = Self {
                script,
                fetched_urls: fetched_urls.clone(),
                close_calls: close_calls.clone(),
            };
            (session, fetched_urls, close_calls)
        }
    }

    #[async_trait]
    impl MarkupSource for FakeSession {
        async fn fetch_markup(&mut self, url: &str) -> Result<String, SessionError> {
            self.fetched_urls.lock().unwrap().push(url.to_string());
            match &self.script {
                SessionScript::Markup(markup) => Ok(markup.clone()),
                SessionScript::FailStart => {
                    Err(SessionError::StartFailed("no usable Chrome binary".to_string()))
                }
                SessionScript::FailNavigation => Err(SessionError::Navigation(
                    "net::ERR_NAME_NOT_RESOLVED".to_string(),
                )),
            }
        }

        async fn close(&mut self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// What the scripted extractor returns
    enum ExtractScript {
        Listings(Vec<ListingItem>),
        Fail,
    }

    struct FakeExtractor {
        script: ExtractScript,
        seen_markup: Arc<Mutex<Option<String>>>,
    }

    impl FakeExtractor {
        fn new(script: ExtractScript) -> (Self, Arc<Mutex<Option<String>>>) {
            let seen_markup = Arc::new(Mutex::new(None));
            let extractor = Self {
                script,
                seen_markup: seen_markup.clone(),
            };
            (extractor, seen_markup)
        }
    }

    #[async_trait]
    impl ListingExtractor for FakeExtractor {
        async fn extract(
            &self,
            markup: &str,
            _instructions: &str,
            _truncate_limit: usize,
        ) -> Result<ListingResponse, ExtractionError> {
            *self.seen_markup.lock().unwrap() = Some(markup.to_string());
            match &self.script {
                ExtractScript::Listings(items) => Ok(ListingResponse {
                    listings: items.clone(),
                }),
                ExtractScript::Fail => Err(ExtractionError::Api("429: rate limited".to_string())),
            }
        }
    }

    const BOGOTA_PAGE: &str = r#"<html><head><title>outer chrome</title></head><body>
<nav>site nav</nav>
<section class="listingsWrapper">
  <div class="listingCard"><div class="title">Apartamento en Chapinero</div><span class="price">$2.500.000</span></div>
  <div class="listingCard"><div class="title">Apartaestudio en Usaquén</div><span class="price">$1.800.000</span></div>
</section>
<footer>site footer</footer></body></html>"#;

    mod close_guarantee {
        use super::*;

        #[tokio::test]
        async fn test_close_called_once_on_success() {
            let (session, _urls, close_calls) =
                FakeSession::new(SessionScript::Markup(BOGOTA_PAGE.to_string()));
            let (extractor, _seen) = FakeExtractor::new(ExtractScript::Listings(vec![]));
            let mut pipeline = Pipeline::new(session, extractor, &test_config());

            let result = pipeline.run("Bogota", "extract everything").await;

            assert!(result.is_ok());
            assert_eq!(close_calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_close_called_once_on_start_failure() {
            let (session, _urls, close_calls) = FakeSession::new(SessionScript::FailStart);
            let (extractor, seen) = FakeExtractor::new(ExtractScript::Listings(vec![]));
            let mut pipeline = Pipeline::new(session, extractor, &test_config());

            let err = pipeline.run("Bogota", "").await.unwrap_err();

            assert_eq!(err.stage(), "session-start");
            assert_eq!(close_calls.load(Ordering::SeqCst), 1);
            assert!(seen.lock().unwrap().is_none());
        }

        #[tokio::test]
        async fn test_close_called_once_on_navigation_failure() {
            let (session, _urls, close_calls) = FakeSession::new(SessionScript::FailNavigation);
            let (extractor, seen) = FakeExtractor::new(ExtractScript::Listings(vec![]));
            let mut pipeline = Pipeline::new(session, extractor, &test_config());

            let err = pipeline.run("Bogota", "").await.unwrap_err();

            assert_eq!(err.stage(), "navigation");
            assert_eq!(close_calls.load(Ordering::SeqCst), 1);
            assert!(seen.lock().unwrap().is_none());
        }

        #[tokio::test]
        async fn test_close_called_once_on_extraction_failure() {
            let (session, _urls, close_calls) =
                FakeSession::new(SessionScript::Markup(BOGOTA_PAGE.to_string()));
            let (extractor, _seen) = FakeExtractor::new(ExtractScript::Fail);
            let mut pipeline = Pipeline::new(session, extractor, &test_config());

            let err = pipeline.run("Bogota", "").await.unwrap_err();

            assert_eq!(err.stage(), "extraction");
            assert_eq!(close_calls.load(Ordering::SeqCst), 1);
        }
    }

    mod end_to_end {
        use super::*;

        #[tokio::test]
        async fn test_bogota_query_yields_both_listings_in_order() {
            let expected = vec![
                item("Apartamento en Chapinero"),
                item("Apartaestudio en Usaquén"),
            ];
            let (session, urls, _close) =
                FakeSession::new(SessionScript::Markup(BOGOTA_PAGE.to_string()));
            let (extractor, seen) = FakeExtractor::new(ExtractScript::Listings(expected.clone()));
            let mut pipeline = Pipeline::new(session, extractor, &test_config());

            let response = pipeline
                .run("Bogota", "extract title and price")
                .await
                .unwrap();

            let fetched = urls.lock().unwrap();
            assert_eq!(fetched.len(), 1);
            assert_eq!(
                fetched[0],
                "https://www.fincaraiz.com.co/arriendo/apartamentos/Bogota"
            );
            assert_eq!(response.listings, expected);

            // The extractor saw only the listings container, not the page chrome
            let markup = seen.lock().unwrap().clone().unwrap();
            assert!(markup.contains("listingsWrapper"));
            assert!(markup.contains("Apartamento en Chapinero"));
            assert!(!markup.contains("site nav"));
            assert!(!markup.contains("site footer"));
        }

        #[tokio::test]
        async fn test_navigation_failure_yields_empty_response() {
            let (session, _urls, close_calls) = FakeSession::new(SessionScript::FailNavigation);
            let (extractor, _seen) = FakeExtractor::new(ExtractScript::Listings(vec![item("x")]));
            let mut pipeline = Pipeline::new(session, extractor, &test_config());

            let response = pipeline.run_or_empty("Bogota", "").await;

            assert_eq!(response, ListingResponse::empty());
            assert_eq!(close_calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_extraction_failure_yields_empty_response() {
            let (session, _urls, close_calls) =
                FakeSession::new(SessionScript::Markup(BOGOTA_PAGE.to_string()));
            let (extractor, _seen) = FakeExtractor::new(ExtractScript::Fail);
            let mut pipeline = Pipeline::new(session, extractor, &test_config());

            let response = pipeline.run_or_empty("Bogota", "").await;

            assert_eq!(response, ListingResponse::empty());
            assert_eq!(close_calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_run_or_empty_passes_successful_results_through() {
            let expected = vec![item("Penthouse en El Poblado")];
            let (session, _urls, _close) =
                FakeSession::new(SessionScript::Markup(BOGOTA_PAGE.to_string()));
            let (extractor, _seen) = FakeExtractor::new(ExtractScript::Listings(expected.clone()));
            let mut pipeline = Pipeline::new(session, extractor, &test_config());

            let response = pipeline.run_or_empty("Medellin", "").await;

            assert_eq!(response.listings, expected);
        }
    }

    mod target_urls {
        use super::*;

        #[tokio::test]
        async fn test_query_is_interpolated_without_encoding() {
            let (session, _urls, _close) = FakeSession::new(SessionScript::FailStart);
            let (extractor, _seen) = FakeExtractor::new(ExtractScript::Listings(vec![]));
            let pipeline = Pipeline::new(session, extractor, &test_config());

            assert_eq!(
                pipeline.target_url("Bogota"),
                "https://www.fincaraiz.com.co/arriendo/apartamentos/Bogota"
            );
            // Reserved characters and non-ASCII pass through verbatim
            assert_eq!(
                pipeline.target_url("Bogota/chapinero alto"),
                "https://www.fincaraiz.com.co/arriendo/apartamentos/Bogota/chapinero alto"
            );
            assert_eq!(
                pipeline.target_url("Medellín"),
                "https://www.fincaraiz.com.co/arriendo/apartamentos/Medellín"
            );
        }
    }
}
