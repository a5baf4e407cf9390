//! Sonarr/Radarr v3 API reporter

use super::traits::FailureReporter;
use crate::config::{CatalogConfig, CatalogsConfig};
use crate::types::Category;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Response;
use serde::Deserialize;
use std::time::Duration;

/// "grabbed" in the v3 history event type enum
const EVENT_TYPE_GRABBED: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPage {
    #[serde(default)]
    records: Vec<HistoryRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    id: i64,
    source_title: String,
    #[serde(default)]
    episode_id: Option<i64>,
    #[serde(default)]
    movie_id: Option<i64>,
}

/// [`FailureReporter`] that talks to Sonarr and Radarr
pub struct ArrReporter {
    http: reqwest::Client,
    catalogs: CatalogsConfig,
}

impl ArrReporter {
    /// Create a reporter for the configured catalogs
    pub fn new(catalogs: CatalogsConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("debridarr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, catalogs })
    }

    fn catalog(&self, category: Category) -> Result<&CatalogConfig> {
        let catalog = self.catalogs.get(category);
        let key = category.as_str().to_uppercase();
        if !catalog.enabled {
            return Err(Error::config(key, format!("{} is not enabled", category)));
        }
        if catalog.url.trim().is_empty() {
            return Err(Error::config(
                format!("{key}_URL"),
                format!("{} has no URL", category),
            ));
        }
        Ok(catalog)
    }

    async fn check(response: Response, category: Category) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            service: category.as_str().to_string(),
            status,
            body,
        })
    }

    async fn find_grab(
        &self,
        catalog: &CatalogConfig,
        category: Category,
        release_title: &str,
    ) -> Result<Option<HistoryRecord>> {
        let url = format!("{}/api/v3/history", catalog.url.trim_end_matches('/'));
        let page_size = catalog.history_page_size.to_string();
        let event_type = EVENT_TYPE_GRABBED.to_string();

        let response = self
            .http
            .get(url)
            .header("X-Api-Key", &catalog.api_key)
            .query(&[
                ("page", "1"),
                ("pageSize", page_size.as_str()),
                ("sortKey", "date"),
                ("sortDirection", "descending"),
                ("eventType", event_type.as_str()),
            ])
            .send()
            .await?;
        let page: HistoryPage = Self::check(response, category).await?.json().await?;

        // Records come newest first
        Ok(page
            .records
            .into_iter()
            .find(|r| r.source_title.eq_ignore_ascii_case(release_title)))
    }

    async fn post_json(
        &self,
        catalog: &CatalogConfig,
        category: Category,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<()> {
        let url = format!("{}{}", catalog.url.trim_end_matches('/'), path);
        let mut request = self.http.post(url).header("X-Api-Key", &catalog.api_key);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        Self::check(response, category).await?;
        Ok(())
    }
}

#[async_trait]
impl FailureReporter for ArrReporter {
    async fn report_failed(&self, release_title: &str, category: Category) -> Result<()> {
        let catalog = self.catalog(category)?;

        let Some(record) = self.find_grab(catalog, category, release_title).await? else {
            return Err(Error::Other(format!(
                "no grabbed history record for '{}' in {}",
                release_title, category
            )));
        };

        self.post_json(
            catalog,
            category,
            &format!("/api/v3/history/failed/{}", record.id),
            None,
        )
        .await?;
        tracing::info!(
            release_title = %release_title,
            category = %category,
            history_id = record.id,
            "marked release as failed"
        );

        let search = match category {
            Category::Sonarr => record
                .episode_id
                .map(|id| serde_json::json!({"name": "EpisodeSearch", "episodeIds": [id]})),
            Category::Radarr => record
                .movie_id
                .map(|id| serde_json::json!({"name": "MoviesSearch", "movieIds": [id]})),
        };

        match search {
            Some(command) => {
                self.post_json(catalog, category, "/api/v3/command", Some(command))
                    .await?;
                tracing::info!(
                    release_title = %release_title,
                    category = %category,
                    "triggered replacement search"
                );
            }
            None => tracing::warn!(
                release_title = %release_title,
                category = %category,
                "history record has no media id, skipping search"
            ),
        }

        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reporter(server: &MockServer, category: Category) -> ArrReporter {
        let catalog = CatalogConfig {
            enabled: true,
            url: server.uri(),
            api_key: "key".to_string(),
            history_page_size: 50,
        };
        let mut catalogs = CatalogsConfig::default();
        match category {
            Category::Sonarr => catalogs.sonarr = catalog,
            Category::Radarr => catalogs.radarr = catalog,
        }
        ArrReporter::new(catalogs, Duration::from_secs(5)).unwrap()
    }

    fn history(records: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "page": 1,
            "pageSize": 50,
            "totalRecords": 2,
            "records": records
        }))
    }

    #[tokio::test]
    async fn radarr_marks_failed_and_searches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/history"))
            .and(header("X-Api-Key", "key"))
            .and(query_param("eventType", "1"))
            .and(query_param("sortDirection", "descending"))
            .respond_with(history(serde_json::json!([
                {"id": 7, "sourceTitle": "Other.Movie", "movieId": 1, "eventType": "grabbed"},
                {"id": 9, "sourceTitle": "Movie.2024.1080p", "movieId": 42, "eventType": "grabbed"}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v3/history/failed/9"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v3/command"))
            .and(body_json(serde_json::json!({"name": "MoviesSearch", "movieIds": [42]})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        reporter(&server, Category::Radarr)
            .report_failed("movie.2024.1080P", Category::Radarr)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sonarr_uses_episode_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/history"))
            .respond_with(history(serde_json::json!([
                {"id": 3, "sourceTitle": "Show.S01E01", "episodeId": 11, "seriesId": 2}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v3/history/failed/3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v3/command"))
            .and(body_json(serde_json::json!({"name": "EpisodeSearch", "episodeIds": [11]})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        reporter(&server, Category::Sonarr)
            .report_failed("Show.S01E01", Category::Sonarr)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_release_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/history"))
            .respond_with(history(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = reporter(&server, Category::Radarr)
            .report_failed("Nothing", Category::Radarr)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn disabled_category_is_config_error() {
        let server = MockServer::start().await;
        let err = reporter(&server, Category::Radarr)
            .report_failed("Show.S01E01", Category::Sonarr)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/history"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let err = reporter(&server, Category::Radarr)
            .report_failed("Movie", Category::Radarr)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 401, .. }), "got {err:?}");
    }
}
