// Remote catalog source - `GET {base}/pokemon/{idOrName}`
//
// The key is always one percent-encoded path segment. Any non-2xx answer is
// "not found". Bodies go through the strict entry
// schema and validation before anything else sees them.

use crate::config::TrackerConfig;
use crate::error::FetchError;
use crate::model::{CatalogEntry, EntryId};
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How an entry is addressed remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    Id(EntryId),
    Name(String),
}

impl LookupKey {
    /// Case-insensitive name lookup; None for a blank name
    pub fn name(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(LookupKey::Name(normalized))
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Id(id) => write!(f, "{}", id),
            LookupKey::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<EntryId> for LookupKey {
    fn from(id: EntryId) -> Self {
        LookupKey::Id(id)
    }
}

/// Read-only remote collaborator
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, key: &LookupKey) -> Result<CatalogEntry, FetchError>;
}

#[async_trait]
impl<T: CatalogSource + ?Sized> CatalogSource for Arc<T> {
    async fn fetch(&self, key: &LookupKey) -> Result<CatalogEntry, FetchError> {
        (**self).fetch(key).await
    }
}

/// Parses and validates one remote body
pub fn decode_entry(key: &LookupKey, body: &str) -> Result<CatalogEntry, FetchError> {
    let entry: CatalogEntry = serde_json::from_str(body).map_err(|e| FetchError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })?;

    entry.validate().map_err(|source| FetchError::Invalid {
        key: key.to_string(),
        source,
    })?;

    Ok(entry)
}

/// PokeAPI over HTTPS
#[derive(Clone)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCatalogSource {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("catalog base URL {} cannot have a path", base_url));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dex-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
        })
    }

    pub fn from_config(config: &TrackerConfig) -> anyhow::Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout)
    }

    fn url_for(&self, key: &LookupKey) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("pokemon")
                .push(&key.to_string());
        }
        url
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self, key: &LookupKey) -> Result<CatalogEntry, FetchError> {
        let url = self.url_for(key);
        debug!("GET {}", url);

        let transport = |e: reqwest::Error| FetchError::Transport {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::NotFound {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        decode_entry(key, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::pikachu_json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> HttpCatalogSource {
        HttpCatalogSource::new(&format!("{}/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_name_key_is_normalized() {
        assert_eq!(
            LookupKey::name("  PikaChu "),
            Some(LookupKey::Name("pikachu".to_string()))
        );
        assert_eq!(LookupKey::name("   "), None);
        assert_eq!(LookupKey::from(EntryId::new(25).unwrap()).to_string(), "25");
    }

    #[tokio::test]
    async fn test_fetch_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pikachu_json()))
            .expect(1)
            .mount(&server)
            .await;

        let entry = source_for(&server)
            .fetch(&LookupKey::Id(EntryId::new(25).unwrap()))
            .await
            .unwrap();

        assert_eq!(entry.name, "pikachu");
        assert_eq!(entry.height, 4);
        assert_eq!(entry.weight, 60);
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/missingno"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .fetch(&LookupKey::name("MissingNo").unwrap())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FetchError::NotFound {
                key: "missingno".to_string(),
                status: 404
            }
        );
    }

    #[tokio::test]
    async fn test_unparseable_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/25"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .fetch(&LookupKey::Id(EntryId::new(25).unwrap()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Malformed { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/25"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(pikachu_json())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let source = HttpCatalogSource::new(&server.uri(), Duration::from_millis(200)).unwrap();
        let err = source
            .fetch(&LookupKey::Id(EntryId::new(25).unwrap()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_name_cannot_escape_its_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/pikachu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pikachu_json()))
            .expect(0)
            .mount(&server)
            .await;

        let source = source_for(&server);
        for name in ["pikachu#raichu", "pikachu?x=1", "x/../pikachu"] {
            let err = source
                .fetch(&LookupKey::name(name).unwrap())
                .await
                .unwrap_err();
            assert!(err.is_not_found(), "{} must not resolve to pikachu: {:?}", name, err);
        }
    }

    #[test]
    fn test_url_keeps_base_path() {
        let source =
            HttpCatalogSource::new("https://pokeapi.co/api/v2/", Duration::from_secs(1)).unwrap();

        assert_eq!(
            source.url_for(&LookupKey::name("mr. mime").unwrap()).as_str(),
            "https://pokeapi.co/api/v2/pokemon/mr.%20mime"
        );
        assert_eq!(
            source.url_for(&LookupKey::Id(EntryId::new(25).unwrap())).as_str(),
            "https://pokeapi.co/api/v2/pokemon/25"
        );
        assert!(HttpCatalogSource::new("mailto:dex@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_decode_rejects_invalid_entry() {
        let mut body = pikachu_json();
        body["name"] = serde_json::json!("");
        let key = LookupKey::Id(EntryId::new(25).unwrap());

        let err = decode_entry(&key, &body.to_string()).unwrap_err();
        assert!(matches!(err, FetchError::Invalid { .. }));
    }
}
