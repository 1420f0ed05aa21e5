//! Raw upstream work → [`CondensedRecord`].
//!
//! Pure and total over anything shaped like an OpenAlex work: absent or null
//! fields come through as `None`/empty. The only hard requirement is the id.

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

use citegraph_common::{AuthorEntry, Citations, CondensedRecord, Publication, TopicPath};
use openalex_client::bare_id;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has no id")]
    MissingId,
}

pub fn normalize(raw: &Value) -> Result<CondensedRecord, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .map(bare_id)
        .filter(|id| !id.is_empty())
        .ok_or(NormalizeError::MissingId)?
        .to_string();

    Ok(CondensedRecord {
        id,
        title: text(raw, "/title"),
        doi: text(raw, "/doi"),
        work_type: text(raw, "/type"),
        authors: authors(raw),
        full_text_url: text(raw, "/best_oa_location/url").or_else(|| text(raw, "/primary_location/pdf_url")),
        publication: publication(raw),
        citations: Citations {
            count: raw.get("cited_by_count").and_then(Value::as_u64).unwrap_or(0),
            referenced_works: array(raw, "/referenced_works")
                .filter_map(Value::as_str)
                .map(|r| bare_id(r).to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        },
        keywords: array(raw, "/keywords")
            .filter_map(|k| text(k, "/display_name"))
            .collect(),
        primary_topic: primary_topic(raw),
        abstract_inverted_index: raw
            .get("abstract_inverted_index")
            .filter(|v| v.is_object())
            .map(Value::to_string),
    })
}

/// True when upstream returned nothing but an id for this work, meaning it
/// has no metadata to offer.
pub fn is_identity_only(raw: &Value) -> bool {
    match raw.as_object() {
        Some(fields) => fields.iter().all(|(k, v)| k == "id" || v.is_null()),
        None => false,
    }
}

fn text(v: &Value, pointer: &str) -> Option<String> {
    match v.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn array<'a>(v: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    v.pointer(pointer)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

fn authors(raw: &Value) -> Vec<AuthorEntry> {
    array(raw, "/authorships")
        .filter_map(|authorship| {
            let name = text(authorship, "/author/display_name")?;
            let affiliations: BTreeSet<String> = array(authorship, "/institutions")
                .filter_map(|inst| text(inst, "/display_name"))
                .collect();
            Some(AuthorEntry { name, affiliations })
        })
        .collect()
}

fn publication(raw: &Value) -> Option<Publication> {
    let publication = Publication {
        journal: text(raw, "/primary_location/source/display_name"),
        volume: text(raw, "/biblio/volume"),
        issue: text(raw, "/biblio/issue"),
        date: text(raw, "/publication_date"),
        first_page: text(raw, "/biblio/first_page"),
        last_page: text(raw, "/biblio/last_page"),
    };
    (publication != Publication::default()).then_some(publication)
}

fn primary_topic(raw: &Value) -> Option<TopicPath> {
    let topic = raw.get("primary_topic").filter(|t| t.is_object())?;
    Some(TopicPath {
        domain: text(topic, "/domain/display_name")?,
        field: text(topic, "/field/display_name")?,
        subfield: text(topic, "/subfield/display_name")?,
        topic: text(topic, "/display_name")?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn full_work() -> Value {
        json!({
            "id": "https://openalex.org/W2741809807",
            "doi": "https://doi.org/10.7717/peerj.4375",
            "title": "The state of OA",
            "type": "article",
            "publication_date": "2018-02-13",
            "cited_by_count": 42,
            "authorships": [
                {
                    "author": {"display_name": "Heather Piwowar"},
                    "institutions": [{"display_name": "Impactstory"}, {"display_name": null}]
                },
                {"author": {"display_name": null}, "institutions": []}
            ],
            "best_oa_location": {"url": "https://peerj.com/articles/4375.pdf"},
            "primary_location": {"source": {"display_name": "PeerJ"}, "pdf_url": "https://other.example/pdf"},
            "biblio": {"volume": "6", "issue": null, "first_page": "e4375", "last_page": 12},
            "referenced_works": ["https://openalex.org/W1", "https://openalex.org/W2"],
            "keywords": [{"display_name": "open access"}, {"display_name": "citation"}],
            "primary_topic": {
                "display_name": "scientometrics",
                "subfield": {"display_name": "Library Science"},
                "field": {"display_name": "Social Sciences"},
                "domain": {"display_name": "Social Sciences"}
            },
            "abstract_inverted_index": {"Despite": [0], "growing": [1]}
        })
    }

    #[test]
    fn full_work_maps_every_field() {
        let r = normalize(&full_work()).unwrap();

        assert_eq!(r.id, "W2741809807");
        assert_eq!(r.title.as_deref(), Some("The state of OA"));
        assert_eq!(r.work_type.as_deref(), Some("article"));
        assert_eq!(r.authors.len(), 1);
        assert_eq!(r.authors[0].name, "Heather Piwowar");
        assert_eq!(
            r.authors[0].affiliations.iter().collect::<Vec<_>>(),
            vec!["Impactstory"]
        );
        assert_eq!(r.full_text_url.as_deref(), Some("https://peerj.com/articles/4375.pdf"));

        let publication = r.publication.as_ref().unwrap();
        assert_eq!(publication.journal.as_deref(), Some("PeerJ"));
        assert_eq!(publication.issue, None);
        assert_eq!(publication.last_page.as_deref(), Some("12"));

        assert_eq!(r.citations.count, 42);
        assert_eq!(r.citations.referenced_works, vec!["W1", "W2"]);
        assert_eq!(r.keywords, vec!["open access", "citation"]);
        assert_eq!(r.primary_topic.as_ref().unwrap().subfield, "Library Science");

        let index: Value = serde_json::from_str(r.abstract_inverted_index.as_deref().unwrap()).unwrap();
        assert_eq!(index["growing"], json!([1]));
    }

    #[test]
    fn pdf_url_is_the_fallback_full_text() {
        let mut raw = full_work();
        raw["best_oa_location"] = Value::Null;
        let r = normalize(&raw).unwrap();
        assert_eq!(r.full_text_url.as_deref(), Some("https://other.example/pdf"));
    }

    #[test]
    fn sparse_work_maps_to_empty_values() {
        let r = normalize(&json!({"id": "https://openalex.org/W7", "title": null})).unwrap();
        assert_eq!(r.id, "W7");
        assert!(r.title.is_none());
        assert!(r.authors.is_empty());
        assert!(r.publication.is_none());
        assert_eq!(r.citations, Citations::default());
        assert!(r.primary_topic.is_none());
        assert!(r.abstract_inverted_index.is_none());
    }

    #[test]
    fn partial_topic_hierarchy_is_dropped() {
        let mut raw = full_work();
        raw["primary_topic"]["field"] = Value::Null;
        assert!(normalize(&raw).unwrap().primary_topic.is_none());
    }

    #[test]
    fn missing_id_is_rejected() {
        assert_eq!(normalize(&json!({"title": "No id"})), Err(NormalizeError::MissingId));
        assert_eq!(normalize(&json!({"id": ""})), Err(NormalizeError::MissingId));
        assert_eq!(normalize(&json!({"id": 17})), Err(NormalizeError::MissingId));
        assert_eq!(normalize(&json!(["W1"])), Err(NormalizeError::NotAnObject));
    }

    #[test]
    fn identity_only_detection() {
        assert!(is_identity_only(&json!({"id": "https://openalex.org/W1"})));
        assert!(is_identity_only(&json!({"id": "W1", "title": null})));
        assert!(!is_identity_only(&json!({"id": "W1", "title": "Real"})));
        assert!(!is_identity_only(&json!("W1")));
    }
}
