//! In-process transport for delivery tests.

use crate::traits::{Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One recorded post.
#[derive(Debug, Clone)]
pub struct Post {
    pub url: String,
    pub content_type: String,
    pub body: Bytes,
}

impl Post {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Records every post and answers with scripted status codes, then 200.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    posts: Mutex<Vec<Post>>,
    script: Mutex<VecDeque<Result<u16, ()>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering<I: IntoIterator<Item = u16>>(statuses: I) -> Self {
        let transport = Self::new();
        transport
            .script
            .lock()
            .unwrap()
            .extend(statuses.into_iter().map(Ok));
        transport
    }

    /// Fail the next post without a status.
    pub fn fail_next(&self) {
        self.script.lock().unwrap().push_back(Err(()));
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, url: &str, content_type: &str, body: Bytes) -> Result<u16, TransportError> {
        self.posts.lock().unwrap().push(Post {
            url: url.to_string(),
            content_type: content_type.to_string(),
            body,
        });
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(())) => Err(TransportError::Request("connection refused".into())),
            None => Ok(200),
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
