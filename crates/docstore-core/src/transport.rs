//! The store-facing seam.
//!
//! A [`Transport`] executes validated requests. Everything it receives has
//! already been bound and checked, so implementations only evaluate and
//! store. Paged reads return a [`ResultPage`] whose continuation token is
//! present iff more items may follow.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use docstore_model::{AttributeValue, CollectionDefinition, CollectionDescription, Item};

use crate::error::TransportError;
use crate::request::{GetRequest, PutRequest, QueryRequest, ScanRequest, UpdateRequest};

/// Executes requests against a store.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Read one item; `None` if it does not exist.
    async fn execute_get(&self, request: &GetRequest) -> Result<Option<Item>, TransportError>;

    /// Create or replace one item. Returns the old item when asked to.
    async fn execute_put(&self, request: &PutRequest) -> Result<Option<Item>, TransportError>;

    /// Read one page of a query.
    async fn execute_query(
        &self,
        request: &QueryRequest,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultPage, TransportError>;

    /// Read one page of a scan.
    async fn execute_scan(
        &self,
        request: &ScanRequest,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultPage, TransportError>;

    /// Update one item, creating it if needed. Returns what the request's
    /// return policy selects.
    async fn execute_update(&self, request: &UpdateRequest) -> Result<Option<Item>, TransportError>;

    /// Create a collection; resolves once it is active.
    async fn create_collection(
        &self,
        definition: CollectionDefinition,
    ) -> Result<CollectionDescription, TransportError>;

    /// Describe an existing collection.
    async fn describe_collection(&self, name: &str) -> Result<CollectionDescription, TransportError>;
}

/// One page of a query or scan.
#[derive(Debug, Clone, Default)]
pub struct ResultPage {
    /// Items that passed the filter, in order.
    pub items: Vec<Item>,
    /// Where the next page starts; `None` on the last page.
    pub continuation: Option<ContinuationToken>,
    /// Items read before filtering.
    pub scanned_count: usize,
}

/// Opaque position in a paged read: the key of the last item read.
///
/// ```
/// use docstore_core::transport::ContinuationToken;
/// use docstore_model::AttributeValue;
///
/// let token = ContinuationToken::from_key([("year".to_owned(), AttributeValue::from(1992_i64))].into());
/// let decoded = ContinuationToken::decode(&token.encode()).unwrap();
/// assert_eq!(decoded, token);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    key: BTreeMap<String, AttributeValue>,
}

impl ContinuationToken {
    /// Wrap the key of the last item read.
    #[must_use]
    pub fn from_key(key: HashMap<String, AttributeValue>) -> Self {
        Self {
            key: key.into_iter().collect(),
        }
    }

    /// The key attributes of the last item read.
    #[must_use]
    pub fn key(&self) -> HashMap<String, AttributeValue> {
        self.key
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The value of one key attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.key.get(name)
    }

    /// Encode as a URL-safe string.
    #[must_use]
    pub fn encode(&self) -> String {
        // Serializing string-keyed maps of attribute values cannot fail.
        let json = serde_json::to_vec(&self.key).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a string produced by [`ContinuationToken::encode`].
    pub fn decode(text: &str) -> Result<Self, TransportError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|e| anyhow::anyhow!("malformed continuation token: {e}"))?;
        let key = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("malformed continuation token: {e}"))?;
        Ok(Self { key })
    }
}

/// Run a transport call under an optional timeout.
pub(crate) async fn with_timeout<T>(
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(TransportError::Timeout {
                elapsed_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })
        }),
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_decode_encoded_token() {
        let token = ContinuationToken::from_key(HashMap::from([
            ("year".to_owned(), AttributeValue::from(2013_i64)),
            ("title".to_owned(), AttributeValue::from("Rush")),
        ]));
        let decoded = ContinuationToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded.get("title"), Some(&AttributeValue::from("Rush")));
        assert_eq!(decoded.key().len(), 2);
    }

    #[test]
    fn test_should_reject_malformed_token() {
        assert!(matches!(
            ContinuationToken::decode("not a token!"),
            Err(TransportError::Other(_))
        ));
    }

    #[tokio::test]
    async fn test_should_time_out_slow_calls() {
        let result: Result<(), TransportError> = with_timeout(
            Some(Duration::from_millis(10)),
            std::future::pending::<Result<(), TransportError>>(),
        )
        .await;
        assert!(matches!(result, Err(TransportError::Timeout { elapsed_ms: 10 })));
    }

    #[tokio::test]
    async fn test_should_pass_through_without_timeout() {
        let result = with_timeout(None, async { Ok::<_, TransportError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
