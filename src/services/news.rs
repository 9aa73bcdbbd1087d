//! Agriculture headlines from NewsAPI

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{fetch_json, http_client};
use crate::types::{IrrigationError, Result};

const PAGE_SIZE: &str = "30";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsArticle {
    pub title: String,
    pub link: String,
    pub image: Option<String>,
    pub category: &'static str,
    pub date: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsFeed {
    pub num_articles: usize,
    pub news: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    source: Option<RawSource>,
    title: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

pub struct NewsClient {
    url: String,
    api_key: Option<String>,
    query: String,
    http_client: reqwest::Client,
}

impl NewsClient {
    pub fn new(url: &str, api_key: Option<String>, query: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            api_key,
            query: query.to_string(),
            http_client: http_client(timeout),
        }
    }

    pub async fn agriculture(&self) -> Result<NewsFeed> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| IrrigationError::Config("News feed is not configured".into()))?;

        debug!(query = %self.query, "Fetching news");
        let request = self.http_client.get(&self.url).query(&[
            ("q", self.query.as_str()),
            ("sortBy", "publishedAt"),
            ("language", "en"),
            ("pageSize", PAGE_SIZE),
            ("apiKey", api_key),
        ]);
        let response: EverythingResponse = fetch_json(request, "News service").await?;
        Ok(map_articles(response.articles))
    }
}

/// Rough topic for a headline
fn categorize(title: &str) -> &'static str {
    let title = title.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| title.contains(w));

    if any(&["tech", "drone", " ai ", "robot", "sensor", "startup", "innovation", "digital"]) {
        "AgTech & Innovation"
    } else if any(&["sustainab", "organic", "climate", "water", "soil", "carbon", "natural"]) {
        "Sustainable Farming"
    } else {
        "Crops & Cultivation"
    }
}

fn map_articles(articles: Vec<RawArticle>) -> NewsFeed {
    let news: Vec<NewsArticle> = articles
        .into_iter()
        .filter_map(|article| {
            let title = article.title.map(|t| t.trim().to_string())?;
            let link = article.url?;
            if title.is_empty() || title == "[Removed]" || link.is_empty() {
                return None;
            }

            Some(NewsArticle {
                category: categorize(&title),
                date: article
                    .published_at
                    .map(|at| at.format("%B %-d, %Y").to_string())
                    .unwrap_or_default(),
                source: article
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_else(|| "Unknown".to_string()),
                image: article.url_to_image,
                title,
                link,
            })
        })
        .collect();

    NewsFeed {
        num_articles: news.len(),
        news,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_articles() {
        let response: EverythingResponse = serde_json::from_str(
            r#"{
                "status": "ok",
                "totalResults": 3,
                "articles": [
                    {
                        "source": {"id": null, "name": "Krishi Jagran"},
                        "title": "Drone spraying pilots expand across Punjab",
                        "url": "https://example.com/drones",
                        "urlToImage": "https://example.com/drones.jpg",
                        "publishedAt": "2025-03-02T08:15:00Z"
                    },
                    {
                        "source": {"id": null, "name": null},
                        "title": "[Removed]",
                        "url": "https://removed.com",
                        "publishedAt": "2025-03-02T08:15:00Z"
                    },
                    {
                        "source": {"name": "Down To Earth"},
                        "title": "Wheat procurement opens early",
                        "url": "https://example.com/wheat",
                        "urlToImage": null,
                        "publishedAt": "2025-03-22T00:00:00Z"
                    },
                    {
                        "title": "No link here",
                        "url": null
                    }
                ]
            }"#,
        )
        .unwrap();

        let feed = map_articles(response.articles);
        assert_eq!(feed.num_articles, 2);

        let first = &feed.news[0];
        assert_eq!(first.date, "March 2, 2025");
        assert_eq!(first.category, "AgTech & Innovation");
        assert_eq!(first.source, "Krishi Jagran");

        let second = &feed.news[1];
        assert_eq!(second.category, "Crops & Cultivation");
        assert_eq!(second.image, None);

        let json = serde_json::to_value(&feed).unwrap();
        assert_eq!(json["numArticles"], 2);
    }

    #[tokio::test]
    async fn test_unconfigured_feed_is_config_error() {
        let client = NewsClient::new("http://localhost", None, "agriculture", Duration::from_secs(1));
        let err = client.agriculture().await.unwrap_err();
        assert!(matches!(err, IrrigationError::Config(_)));
    }
}
