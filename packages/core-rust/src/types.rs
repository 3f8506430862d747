//! Domain records shared by the gateway and the provider services.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

// ---------------------------------------------------------------------------
// Provider records
// ---------------------------------------------------------------------------

/// A book as reported by the book provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub title: String,
    /// Comma-separated author list.
    pub author: String,
}

/// An album as reported by the album provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub title: String,
    pub artist: String,
}

// ---------------------------------------------------------------------------
// MediaItem
// ---------------------------------------------------------------------------

/// Which provider produced a [`MediaItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Book,
    Album,
}

impl MediaKind {
    /// Stable lowercase label, matching the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Album => "album",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified search hit returned to gateway callers.
///
/// Fields are private: the only way to build an item is from a provider
/// record, which fixes `kind` to the provider that supplied it. Deserialization
/// is allowed so clients of the gateway can read responses back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    title: String,
    creator: String,
    kind: MediaKind,
}

impl MediaItem {
    /// Builds a `Book`-tagged item; the author becomes the creator.
    #[must_use]
    pub fn from_book(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            creator: book.author.clone(),
            kind: MediaKind::Book,
        }
    }

    /// Builds an `Album`-tagged item; the artist becomes the creator.
    #[must_use]
    pub fn from_album(album: &Album) -> Self {
        Self {
            title: album.title.clone(),
            creator: album.artist.clone(),
            kind: MediaKind::Album,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn creator(&self) -> &str {
        &self.creator
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

// ---------------------------------------------------------------------------
// SearchQuery
// ---------------------------------------------------------------------------

/// Validated, non-empty query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery(String);

impl SearchQuery {
    /// Validates raw query text.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EmptyQuery`] when the text is empty or only
    /// whitespace.
    pub fn parse(text: &str) -> Result<Self, SearchError> {
        if text.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        Ok(Self(text.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SearchResult / HealthStatus
// ---------------------------------------------------------------------------

/// Merged output of one fan-out search.
///
/// `items` preserves provider order: every book precedes every album.
/// `degraded` is set when at least one backend's contribution was replaced by
/// an empty set because its call failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub items: Vec<MediaItem>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl SearchResult {
    /// Concatenates book hits followed by album hits, tagging each by origin.
    #[must_use]
    pub fn merge(books: &[Book], albums: &[Album]) -> Self {
        let items = books
            .iter()
            .map(MediaItem::from_book)
            .chain(albums.iter().map(MediaItem::from_album))
            .collect();
        Self {
            items,
            error_message: None,
            degraded: false,
        }
    }
}

/// HTTP-style health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl HealthStatus {
    pub const OK: u16 = 200;
    pub const UNAVAILABLE: u16 = 503;

    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: Self::OK,
            error_message: None,
        }
    }

    /// Health of a dependency whose status check failed.
    #[must_use]
    pub fn unavailable(error: &SearchError) -> Self {
        Self {
            code: Self::UNAVAILABLE,
            error_message: Some(error.to_string()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.code)
    }
}
