use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// --- Condensed record ---

/// A normalized upstream work. This is the unit that moves through the
/// staging log into the graph, and the shape every pipeline stage shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedRecord {
    /// Bare upstream token (e.g. `W2741809807`); natural key of the `paper` node.
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(rename = "type", default)]
    pub work_type: Option<String>,
    #[serde(default)]
    pub authors: Vec<AuthorEntry>,
    #[serde(default)]
    pub full_text_url: Option<String>,
    #[serde(default)]
    pub publication: Option<Publication>,
    #[serde(default)]
    pub citations: Citations,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub primary_topic: Option<TopicPath>,
    /// Serialized word → positions map. `None` means no abstract is available.
    #[serde(default)]
    pub abstract_inverted_index: Option<String>,
}

impl CondensedRecord {
    /// A record with neither title nor type carries no descriptive identity
    /// and is written to the graph as a stub.
    pub fn has_metadata(&self) -> bool {
        self.title.is_some() || self.work_type.is_some()
    }

    pub fn state(&self) -> PaperState {
        if self.has_metadata() {
            PaperState::Full
        } else {
            PaperState::Stub
        }
    }

    pub fn keyword_string(&self) -> String {
        self.keywords.join(", ")
    }

    pub fn is_open_access(&self) -> bool {
        self.full_text_url.is_some()
    }

    pub fn journal(&self) -> Option<&str> {
        self.publication.as_ref().and_then(|p| p.journal.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorEntry {
    /// Display name. Also the author's identity key, so two people sharing a
    /// display name collapse into one `author` node.
    pub name: String,
    #[serde(default)]
    pub affiliations: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub first_page: Option<String>,
    #[serde(default)]
    pub last_page: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citations {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub referenced_works: Vec<String>,
}

/// Four-level topic hierarchy, broadest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPath {
    pub domain: String,
    pub field: String,
    pub subfield: String,
    pub topic: String,
}

// --- Graph vocabulary ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLabel {
    Paper,
    Author,
    Venue,
    Institution,
    Domain,
    Field,
    Subfield,
    Topic,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 8] = [
        NodeLabel::Paper,
        NodeLabel::Author,
        NodeLabel::Venue,
        NodeLabel::Institution,
        NodeLabel::Domain,
        NodeLabel::Field,
        NodeLabel::Subfield,
        NodeLabel::Topic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Paper => "paper",
            NodeLabel::Author => "author",
            NodeLabel::Venue => "venue",
            NodeLabel::Institution => "institution",
            NodeLabel::Domain => "domain",
            NodeLabel::Field => "field",
            NodeLabel::Subfield => "subfield",
            NodeLabel::Topic => "topic",
        }
    }

    /// Property holding the natural key nodes of this label are upserted by.
    pub fn key_property(&self) -> &'static str {
        match self {
            NodeLabel::Paper => "id",
            _ => "name",
        }
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelType {
    HasAuthor,
    AffiliatedWith,
    PublishedIn,
    HasTopic,
    BelongsTo,
    Cites,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::HasAuthor => "has_author",
            RelType::AffiliatedWith => "affiliated_with",
            RelType::PublishedIn => "published_in",
            RelType::HasTopic => "has_topic",
            RelType::BelongsTo => "belongs_to",
            RelType::Cites => "cites",
        }
    }
}

impl std::fmt::Display for RelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle tag stored on every `paper` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperState {
    /// Placeholder created as a citation target; only the id is known.
    Stub,
    Full,
}

impl PaperState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperState::Stub => "stub",
            PaperState::Full => "full",
        }
    }
}
