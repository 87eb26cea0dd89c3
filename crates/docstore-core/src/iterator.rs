//! Lazy iteration over paged query and scan results.
//!
//! A [`ResultIterator`] fetches its first page when it is created and each
//! later page only once the caller has consumed the buffered one. Pages are
//! requested strictly in continuation order. A failed continuation fetch or
//! a cancellation yields one error and ends the iteration; items already
//! yielded stay valid and nothing is retried.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use docstore_model::Item;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AccessError, TransportError};
use crate::request::{QueryRequest, ScanRequest};
use crate::transport::{ContinuationToken, ResultPage, Transport, with_timeout};

/// A request that is read page by page.
#[derive(Debug, Clone)]
pub enum PagedRequest {
    /// A query.
    Query(QueryRequest),
    /// A scan.
    Scan(ScanRequest),
}

impl PagedRequest {
    /// Target collection.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::Query(r) => &r.collection,
            Self::Scan(r) => &r.collection,
        }
    }

    async fn execute(
        &self,
        transport: &dyn Transport,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultPage, TransportError> {
        match self {
            Self::Query(r) => transport.execute_query(r, continuation).await,
            Self::Scan(r) => transport.execute_scan(r, continuation).await,
        }
    }
}

impl From<QueryRequest> for PagedRequest {
    fn from(request: QueryRequest) -> Self {
        Self::Query(request)
    }
}

impl From<ScanRequest> for PagedRequest {
    fn from(request: ScanRequest) -> Self {
        Self::Scan(request)
    }
}

/// Why a page was not fetched.
enum Interrupted {
    Cancelled,
    Failed(TransportError),
}

/// Finite, non-restartable sequence of the items of a query or scan.
#[derive(Debug)]
pub struct ResultIterator {
    transport: Arc<dyn Transport>,
    request: PagedRequest,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    buffer: VecDeque<Item>,
    continuation: Option<ContinuationToken>,
    pages: usize,
    scanned: usize,
    finished: bool,
}

impl ResultIterator {
    /// Start iterating `request`, fetching the first page now.
    ///
    /// Fails with [`AccessError::Transport`] if the first page cannot be
    /// read and with [`AccessError::Cancelled`] if `cancel` already fired.
    pub async fn start(
        transport: Arc<dyn Transport>,
        request: impl Into<PagedRequest>,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Self, AccessError> {
        let mut iter = Self {
            transport,
            request: request.into(),
            cancel,
            timeout,
            buffer: VecDeque::new(),
            continuation: None,
            pages: 0,
            scanned: 0,
            finished: false,
        };

        match iter.fetch(None).await {
            Ok(page) => {
                iter.absorb(page);
                Ok(iter)
            }
            Err(Interrupted::Cancelled) => Err(iter.cancelled()),
            Err(Interrupted::Failed(source)) => Err(AccessError::Transport {
                collection: iter.request.collection().to_owned(),
                source,
            }),
        }
    }

    /// The next item, fetching the next page when the buffer runs dry.
    pub async fn next(&mut self) -> Option<Result<Item, AccessError>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            let Some(token) = self.continuation.take() else {
                self.finished = true;
                return None;
            };

            match self.fetch(Some(&token)).await {
                Ok(page) => self.absorb(page),
                Err(interrupted) => {
                    self.finished = true;
                    return Some(Err(match interrupted {
                        Interrupted::Cancelled => self.cancelled(),
                        Interrupted::Failed(source) => AccessError::Iteration {
                            collection: self.request.collection().to_owned(),
                            page: self.pages + 1,
                            source,
                        },
                    }));
                }
            }
        }
    }

    /// Pages fetched so far.
    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Items read by the store so far, before filtering.
    #[must_use]
    pub fn scanned_count(&self) -> usize {
        self.scanned
    }

    /// The request being iterated.
    #[must_use]
    pub fn request(&self) -> &PagedRequest {
        &self.request
    }

    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Item, AccessError>> {
        futures::stream::unfold(self, |mut iter| async move {
            iter.next().await.map(|item| (item, iter))
        })
    }

    /// Drain every remaining item, stopping at the first error.
    pub async fn collect_items(mut self) -> Result<Vec<Item>, AccessError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    async fn fetch(&self, continuation: Option<&ContinuationToken>) -> Result<ResultPage, Interrupted> {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        let call = with_timeout(
            self.timeout,
            self.request.execute(self.transport.as_ref(), continuation),
        );
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            result = call => result.map_err(Interrupted::Failed),
        }
    }

    fn absorb(&mut self, page: ResultPage) {
        self.pages += 1;
        self.scanned += page.scanned_count;
        debug!(
            collection = %self.request.collection(),
            page = self.pages,
            items = page.items.len(),
            scanned = page.scanned_count,
            more = page.continuation.is_some(),
            "fetched result page"
        );
        self.buffer.extend(page.items);
        self.continuation = page.continuation;
    }

    fn cancelled(&self) -> AccessError {
        AccessError::Cancelled {
            collection: self.request.collection().to_owned(),
            pages: self.pages,
        }
    }
}
