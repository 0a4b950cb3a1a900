//! Generation Service interface
//!
//! The service turns a request into a stream of text chunks. Failures the
//! service notices after the stream has started are reported in-band, as
//! sentinel text inside the stream; transport failures surface as `Err`
//! items.

use crate::error::ServiceError;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

/// Chunks in arrival order
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ServiceError>> + Send>>;

/// Request for a fresh document body
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub template_type: String,
    #[serde(default)]
    pub form_data: BTreeMap<String, String>,
    #[serde(default)]
    pub context_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteCommand {
    #[serde(alias = "polish", alias = "润色")]
    Paraphrase,
    #[serde(alias = "扩写")]
    Expand,
    #[serde(alias = "shorten", alias = "缩写")]
    Condense,
}

impl RewriteCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteCommand::Paraphrase => "paraphrase",
            RewriteCommand::Expand => "expand",
            RewriteCommand::Condense => "condense",
        }
    }

    /// Label shown next to the affordance
    pub fn label(&self) -> &'static str {
        match self {
            RewriteCommand::Paraphrase => "润色",
            RewriteCommand::Expand => "扩写",
            RewriteCommand::Condense => "缩写",
        }
    }
}

impl fmt::Display for RewriteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewriteCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "paraphrase" | "polish" | "润色" => Ok(RewriteCommand::Paraphrase),
            "expand" | "扩写" => Ok(RewriteCommand::Expand),
            "condense" | "shorten" | "缩写" => Ok(RewriteCommand::Condense),
            other => Err(format!("unknown rewrite command: {other}")),
        }
    }
}

/// Scoped rewrite of a selected span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRequest {
    pub text: String,
    pub command: RewriteCommand,
    #[serde(default)]
    pub context_before: String,
    #[serde(default)]
    pub context_after: String,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Start a generation stream
    ///
    /// An `Err` here means the stream never started.
    async fn generate(&self, request: GenerateRequest) -> Result<TextStream, ServiceError>;

    async fn rewrite(&self, request: RewriteRequest) -> Result<TextStream, ServiceError>;
}

/// Wrap already-known chunks as a [`TextStream`]
pub fn text_stream<I, S>(chunks: I) -> TextStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let items: Vec<Result<String, ServiceError>> =
        chunks.into_iter().map(|c| Ok(c.into())).collect();
    Box::pin(stream::iter(items))
}
