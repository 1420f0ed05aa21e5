//! Translation of condensed records into natural-key upserts.
//!
//! A [`MergePlan`] is the full set of writes one batch produces: node upserts
//! keyed by `(label, natural key)` and edge upserts keyed by
//! `(from, type, to)`. Duplicate writes inside a batch are folded together so
//! that applying the plan never depends on the order records arrived in.

use std::collections::BTreeMap;

use citegraph_common::{CondensedRecord, NodeLabel, PaperState, RelType};

pub type Attributes = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<Option<&str>> for AttrValue {
    fn from(v: Option<&str>) -> Self {
        match v {
            Some(s) => AttrValue::Str(s.to_string()),
            None => AttrValue::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub label: NodeLabel,
    pub key: String,
}

impl NodeKey {
    pub fn new(label: NodeLabel, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }

    pub fn paper(id: impl Into<String>) -> Self {
        Self::new(NodeLabel::Paper, id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub from: NodeKey,
    pub rel: RelType,
    pub to: NodeKey,
}

/// What a plan does to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeWrite {
    /// Make sure the node exists. A `paper` created this way is a stub.
    Ensure,
    /// Make sure the node exists and overwrite the listed attributes.
    Set(Attributes),
}

impl NodeWrite {
    /// `Set` always wins over `Ensure`; between two `Set`s the later one wins.
    fn absorb(&mut self, other: NodeWrite) {
        match other {
            NodeWrite::Ensure => {}
            set @ NodeWrite::Set(_) => *self = set,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    pub nodes: BTreeMap<NodeKey, NodeWrite>,
    pub edges: BTreeMap<EdgeKey, Attributes>,
}

impl MergePlan {
    pub fn from_batch(records: &[CondensedRecord], include_citation_edges: bool) -> Self {
        let mut plan = MergePlan::default();
        for record in records {
            plan.add_record(record, include_citation_edges);
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Ids of every `paper` node the plan touches, stub targets included.
    pub fn paper_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .keys()
            .filter(|k| k.label == NodeLabel::Paper)
            .map(|k| k.key.as_str())
    }

    pub fn upsert_node(&mut self, node: NodeKey, write: NodeWrite) {
        match self.nodes.get_mut(&node) {
            Some(existing) => existing.absorb(write),
            None => {
                self.nodes.insert(node, write);
            }
        }
    }

    /// Upsert an edge and both of its endpoints.
    pub fn upsert_edge(&mut self, from: NodeKey, rel: RelType, to: NodeKey, attributes: Attributes) {
        self.upsert_node(from.clone(), NodeWrite::Ensure);
        self.upsert_node(to.clone(), NodeWrite::Ensure);
        self.edges.insert(EdgeKey { from, rel, to }, attributes);
    }

    fn add_record(&mut self, record: &CondensedRecord, include_citation_edges: bool) {
        let paper = NodeKey::paper(&record.id);
        match record.state() {
            PaperState::Full => self.upsert_node(paper.clone(), NodeWrite::Set(paper_attributes(record))),
            PaperState::Stub => self.upsert_node(paper.clone(), NodeWrite::Ensure),
        }

        if let (Some(publication), Some(journal)) = (&record.publication, record.journal()) {
            let mut attrs = Attributes::new();
            attrs.insert("date".into(), publication.date.as_deref().into());
            attrs.insert("volume".into(), publication.volume.as_deref().into());
            attrs.insert("issue".into(), publication.issue.as_deref().into());
            attrs.insert("first_page".into(), publication.first_page.as_deref().into());
            attrs.insert("last_page".into(), publication.last_page.as_deref().into());
            self.upsert_edge(
                paper.clone(),
                RelType::PublishedIn,
                NodeKey::new(NodeLabel::Venue, journal),
                attrs,
            );
        }

        for author in &record.authors {
            let author_key = NodeKey::new(NodeLabel::Author, &author.name);
            self.upsert_edge(paper.clone(), RelType::HasAuthor, author_key.clone(), Attributes::new());
            for institution in &author.affiliations {
                self.upsert_edge(
                    author_key.clone(),
                    RelType::AffiliatedWith,
                    NodeKey::new(NodeLabel::Institution, institution),
                    Attributes::new(),
                );
            }
        }

        if let Some(topic) = &record.primary_topic {
            let domain = NodeKey::new(NodeLabel::Domain, &topic.domain);
            let field = NodeKey::new(NodeLabel::Field, &topic.field);
            let subfield = NodeKey::new(NodeLabel::Subfield, &topic.subfield);
            let leaf = NodeKey::new(NodeLabel::Topic, &topic.topic);
            self.upsert_edge(field.clone(), RelType::BelongsTo, domain, Attributes::new());
            self.upsert_edge(subfield.clone(), RelType::BelongsTo, field, Attributes::new());
            self.upsert_edge(leaf.clone(), RelType::BelongsTo, subfield, Attributes::new());
            self.upsert_edge(paper.clone(), RelType::HasTopic, leaf, Attributes::new());
        }

        if include_citation_edges {
            for cited in &record.citations.referenced_works {
                self.upsert_edge(paper.clone(), RelType::Cites, NodeKey::paper(cited), Attributes::new());
            }
        }
    }
}

/// Scalar attributes written onto a full `paper` node. Absent values are
/// written as null so a re-ingest clears fields upstream dropped.
pub fn paper_attributes(record: &CondensedRecord) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("state".into(), AttrValue::Str(PaperState::Full.as_str().into()));
    attrs.insert("doi".into(), record.doi.as_deref().into());
    attrs.insert("title".into(), record.title.as_deref().into());
    attrs.insert("type".into(), record.work_type.as_deref().into());
    attrs.insert(
        "cited_by_count".into(),
        AttrValue::Int(i64::try_from(record.citations.count).unwrap_or(i64::MAX)),
    );
    attrs.insert("is_open_access".into(), AttrValue::Bool(record.is_open_access()));
    attrs.insert("full_source".into(), record.full_text_url.as_deref().into());
    attrs.insert("keywords".into(), AttrValue::Str(record.keyword_string()));
    attrs.insert(
        "abstract_inverted_index".into(),
        record.abstract_inverted_index.as_deref().into(),
    );
    attrs
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use citegraph_common::{AuthorEntry, Citations, Publication, TopicPath};

    use super::*;

    fn record(id: &str) -> CondensedRecord {
        CondensedRecord {
            id: id.into(),
            title: Some(format!("Paper {id}")),
            doi: None,
            work_type: Some("article".into()),
            authors: vec![],
            full_text_url: None,
            publication: None,
            citations: Citations::default(),
            keywords: vec![],
            primary_topic: None,
            abstract_inverted_index: None,
        }
    }

    #[test]
    fn citation_targets_are_ensured_not_overwritten() {
        let mut citing = record("W1");
        citing.citations.referenced_works = vec!["W2".into()];
        let cited = record("W2");

        let forward = MergePlan::from_batch(&[citing.clone(), cited.clone()], true);
        let backward = MergePlan::from_batch(&[cited, citing], true);

        assert_eq!(forward, backward);
        assert!(matches!(forward.nodes[&NodeKey::paper("W2")], NodeWrite::Set(_)));
    }

    #[test]
    fn citation_edges_are_skipped_when_disabled() {
        let mut citing = record("W1");
        citing.citations.referenced_works = vec!["W2".into(), "W3".into()];

        let plan = MergePlan::from_batch(&[citing], false);
        assert_eq!(plan.paper_ids().collect::<Vec<_>>(), vec!["W1"]);
        assert!(plan.edges.keys().all(|e| e.rel != RelType::Cites));
    }

    #[test]
    fn shared_venue_is_one_node_with_one_edge_per_paper() {
        let mut a = record("W1");
        let mut b = record("W2");
        for r in [&mut a, &mut b] {
            r.publication = Some(Publication {
                journal: Some("Nature".into()),
                ..Default::default()
            });
        }

        let plan = MergePlan::from_batch(&[a, b], true);
        let venues = plan.nodes.keys().filter(|k| k.label == NodeLabel::Venue).count();
        let published = plan.edges.keys().filter(|e| e.rel == RelType::PublishedIn).count();
        assert_eq!(venues, 1);
        assert_eq!(published, 2);
    }

    #[test]
    fn publication_without_journal_writes_no_venue() {
        let mut r = record("W1");
        r.publication = Some(Publication {
            date: Some("2024-01-01".into()),
            ..Default::default()
        });
        let plan = MergePlan::from_batch(&[r], true);
        assert!(plan.edges.is_empty());
    }

    #[test]
    fn topic_hierarchy_links_each_level_upward() {
        let mut r = record("W1");
        r.primary_topic = Some(TopicPath {
            domain: "Physical Sciences".into(),
            field: "Computer Science".into(),
            subfield: "Artificial Intelligence".into(),
            topic: "Graph Neural Networks".into(),
        });
        let plan = MergePlan::from_batch(&[r], true);

        let belongs: Vec<_> = plan
            .edges
            .keys()
            .filter(|e| e.rel == RelType::BelongsTo)
            .map(|e| (e.from.label, e.to.label))
            .collect();
        assert_eq!(belongs.len(), 3);
        assert!(belongs.contains(&(NodeLabel::Field, NodeLabel::Domain)));
        assert!(belongs.contains(&(NodeLabel::Subfield, NodeLabel::Field)));
        assert!(belongs.contains(&(NodeLabel::Topic, NodeLabel::Subfield)));
        assert!(plan
            .edges
            .keys()
            .any(|e| e.rel == RelType::HasTopic && e.to.key == "Graph Neural Networks"));
    }

    #[test]
    fn authors_and_affiliations_become_edges() {
        let mut r = record("W1");
        r.authors = vec![AuthorEntry {
            name: "Ada Lovelace".into(),
            affiliations: BTreeSet::from(["University of London".to_string()]),
        }];
        let plan = MergePlan::from_batch(&[r], true);

        assert!(plan.edges.contains_key(&EdgeKey {
            from: NodeKey::paper("W1"),
            rel: RelType::HasAuthor,
            to: NodeKey::new(NodeLabel::Author, "Ada Lovelace"),
        }));
        assert!(plan.edges.contains_key(&EdgeKey {
            from: NodeKey::new(NodeLabel::Author, "Ada Lovelace"),
            rel: RelType::AffiliatedWith,
            to: NodeKey::new(NodeLabel::Institution, "University of London"),
        }));
    }

    #[test]
    fn metadata_less_record_only_ensures_its_paper() {
        let mut r = record("W1");
        r.title = None;
        r.work_type = None;
        let plan = MergePlan::from_batch(&[r], true);
        assert_eq!(plan.nodes[&NodeKey::paper("W1")], NodeWrite::Ensure);
    }

    #[test]
    fn paper_attributes_null_out_missing_fields() {
        let mut r = record("W1");
        r.full_text_url = Some("https://example.org/w1.pdf".into());
        r.citations.count = 12;
        let attrs = paper_attributes(&r);

        assert_eq!(attrs["doi"], AttrValue::Null);
        assert_eq!(attrs["cited_by_count"], AttrValue::Int(12));
        assert_eq!(attrs["is_open_access"], AttrValue::Bool(true));
        assert_eq!(attrs["state"], AttrValue::Str("full".into()));
    }
}
