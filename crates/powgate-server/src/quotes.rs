use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::Rng;
use thiserror::Error;
use tokio::fs;

/// Error returned when a random quote is requested from an empty
/// collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("quote collection is empty")]
pub struct NoQuotes;

/// An immutable collection of quotes loaded at startup.
///
/// Selection is uniform; reads take no lock because the collection never
/// changes after load.
#[derive(Debug, Clone)]
pub struct QuoteStore {
    quotes: Vec<String>,
}

impl QuoteStore {
    /// Loads quotes from a line-oriented text file.
    ///
    /// Blank lines and lines starting with `#` are comments. Fails if the
    /// file cannot be read or nothing remains after filtering.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading quotes from {}", path.display()))?;
        let quotes: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect();
        if quotes.is_empty() {
            bail!("no quotes found in {}", path.display());
        }
        Ok(Self { quotes })
    }

    /// Builds a store from an in-memory collection.
    #[must_use]
    pub fn from_quotes(quotes: Vec<String>) -> Self {
        Self { quotes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Returns a uniformly random quote, or [`NoQuotes`] if the collection
    /// is empty.
    pub fn get_random(&self) -> Result<&str, NoQuotes> {
        if self.quotes.is_empty() {
            return Err(NoQuotes);
        }
        let index = rand::thread_rng().gen_range(0..self.quotes.len());
        Ok(&self.quotes[index])
    }
}
