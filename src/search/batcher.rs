use std::collections::HashSet;

use crate::host::{ApiError, CommitRef};

/// Longest query string the host's issue search accepts.
pub const MAX_QUERY_LEN: usize = 256;
/// Length SHAs are shortened to before searching. Collisions between two
/// commits sharing a 10-character prefix are possible and not handled.
pub const SHORT_SHA_LEN: usize = 10;
/// SHAs per query: 18 shortened SHAs plus separators leave room for the
/// repository and type qualifiers.
pub const BATCH_SIZE: usize = 18;

/// Splits commits into batches of shortened SHAs, each small enough to fit
/// one search query together with its qualifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaBatcher {
    batch_size: usize,
    sha_len: usize,
}

impl Default for ShaBatcher {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            sha_len: SHORT_SHA_LEN,
        }
    }
}

impl ShaBatcher {
    /// A batcher whose batches, joined by spaces and followed by a space and
    /// `qualifiers`, never exceed [`MAX_QUERY_LEN`]. Uses [`BATCH_SIZE`]
    /// unless the qualifiers are long enough to require fewer SHAs.
    pub fn for_qualifiers(qualifiers: &str) -> Result<Self, ApiError> {
        let available = MAX_QUERY_LEN.saturating_sub(qualifiers.len());
        let fits = available / (SHORT_SHA_LEN + 1);
        if fits == 0 {
            return Err(ApiError::QueryTooLong {
                len: qualifiers.len() + SHORT_SHA_LEN + 1,
                max: MAX_QUERY_LEN,
            });
        }
        Ok(Self {
            batch_size: fits.min(BATCH_SIZE),
            sha_len: SHORT_SHA_LEN,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Deduplicate (first occurrence wins), shorten, and partition in order.
    /// Fails on the first commit whose SHA cannot be resolved.
    pub fn batch<'a>(
        &self,
        commits: impl IntoIterator<Item = &'a CommitRef>,
    ) -> Result<Vec<Vec<String>>, ApiError> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for commit in commits {
            let sha = commit.sha()?;
            if seen.insert(sha.to_string()) {
                unique.push(shorten(sha, self.sha_len));
            }
        }
        Ok(unique
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect())
    }
}

fn shorten(sha: &str, len: usize) -> String {
    sha.chars().take(len).collect()
}
