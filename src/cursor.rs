//! Cursor implementation for paging over query results.

use crate::document::DocumentEncoding;
use crate::error::DriverResult;
use async_trait::async_trait;
use bson::Document;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Engine side source of query results.
#[async_trait]
pub trait ResultCursor: Send {
    /// Fetch up to `max` further documents. An empty batch means exhausted.
    async fn next_batch(&mut self, max: usize) -> DriverResult<Vec<Document>>;

    /// Release engine resources held by the cursor.
    async fn close(&mut self) {}
}

/// A result cursor over documents that are already materialized.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    buffer: VecDeque<Document>,
}

impl BufferedCursor {
    /// Create a cursor over `documents`, yielded in order.
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            buffer: documents.into(),
        }
    }

    /// Number of documents not yet returned.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }
}

#[async_trait]
impl ResultCursor for BufferedCursor {
    async fn next_batch(&mut self, max: usize) -> DriverResult<Vec<Document>> {
        let take = max.min(self.buffer.len());
        Ok(self.buffer.drain(..take).collect())
    }

    async fn close(&mut self) {
        self.buffer.clear();
    }
}

/// Internal cursor state.
pub(crate) struct CursorState {
    /// Where further documents come from.
    pub source: Box<dyn ResultCursor>,
    /// Whether the source is exhausted.
    pub exhausted: bool,
    /// The namespace (db.collection).
    pub namespace: String,
}

/// A live cursor kept open between bridge calls.
///
/// Clones share the same underlying position.
///
/// # Example
///
/// ```ignore
/// let cursor = Cursor::new("app.users", source, DocumentEncoding::Json);
/// let page = cursor.next_page(10).await?;
/// ```
#[derive(Clone)]
pub struct Cursor {
    state: Arc<Mutex<CursorState>>,
    encoding: DocumentEncoding,
}

impl Cursor {
    /// Wrap an engine cursor.
    pub fn new(
        namespace: impl Into<String>,
        source: Box<dyn ResultCursor>,
        encoding: DocumentEncoding,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(CursorState {
                source,
                exhausted: false,
                namespace: namespace.into(),
            })),
            encoding,
        }
    }

    /// Output encoding chosen when the cursor was opened.
    pub fn encoding(&self) -> DocumentEncoding {
        self.encoding
    }

    /// The namespace the cursor reads from.
    pub async fn namespace(&self) -> String {
        self.state.lock().await.namespace.clone()
    }

    /// Check if the cursor is exhausted.
    pub async fn is_exhausted(&self) -> bool {
        self.state.lock().await.exhausted
    }

    /// Fetch the next page of at most `batch_size` documents.
    pub async fn next_page(&self, batch_size: usize) -> DriverResult<Vec<Document>> {
        let mut state = self.state.lock().await;
        if state.exhausted || batch_size == 0 {
            return Ok(Vec::new());
        }

        match state.source.next_batch(batch_size).await {
            Ok(page) => {
                if page.is_empty() {
                    state.exhausted = true;
                }
                Ok(page)
            }
            Err(e) => {
                state.exhausted = true;
                Err(e)
            }
        }
    }

    /// Try to get the next document.
    pub async fn try_next(&self) -> DriverResult<Option<Document>> {
        Ok(self.next_page(1).await?.into_iter().next())
    }

    /// Collect all remaining documents into a vector.
    pub async fn collect(self) -> DriverResult<Vec<Document>> {
        let mut results = Vec::new();
        while let Some(doc) = self.try_next().await? {
            results.push(doc);
        }
        Ok(results)
    }

    /// Close the cursor.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if !state.exhausted {
            state.source.close().await;
        }
        state.exhausted = true;
    }

    /// Consume the cursor as a stream of documents.
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<Document>> {
        stream::unfold(Some(self), |cursor| async move {
            let cursor = cursor?;
            match cursor.try_next().await {
                Ok(Some(doc)) => Some((Ok(doc), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}
