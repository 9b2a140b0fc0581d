//! Newline-delimited JSON decoding for watch responses.

use futures_util::TryStreamExt;
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio_util::io::StreamReader;

use crate::watch::client::SourceError;
use crate::watch::types::WatchEvent;

type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// An open watch response, read one event per line.
pub struct WatchStream {
    lines: Lines<BufReader<BodyReader>>,
}

impl WatchStream {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        let body = response.bytes_stream().map_err(io::Error::other);
        Self::from_reader(StreamReader::new(body))
    }

    pub(crate) fn from_reader(reader: impl AsyncRead + Send + 'static) -> Self {
        let reader: BodyReader = Box::pin(reader);
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// Next event, or `None` once the server closes the stream.
    pub async fn next_event(&mut self) -> Result<Option<WatchEvent>, SourceError> {
        while let Some(line) = self.lines.next_line().await.map_err(SourceError::Stream)? {
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(&line)?));
        }
        Ok(None)
    }
}
