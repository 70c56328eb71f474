//! Replication data model.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sparql;

/// An RDF term in object position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// A reference to another resource.
    Iri(String),
    /// Plain text, optionally language-tagged.
    Text { value: String, lang: Option<String> },
    /// A literal carrying an explicit datatype IRI.
    Typed { value: String, datatype: String },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
            lang: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Typed {
            value: value.into(),
            datatype: datatype.into(),
        }
    }

    /// The IRI, if this term is a reference.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// Lexical form, regardless of kind.
    pub fn lexical(&self) -> &str {
        match self {
            Self::Iri(v) => v,
            Self::Text { value, .. } => value,
            Self::Typed { value, .. } => value,
        }
    }

    /// Render this term in SPARQL syntax.
    pub fn to_sparql(&self) -> String {
        match self {
            Self::Iri(iri) => sparql::escape_iri(iri),
            Self::Text { value, lang } => sparql::escape_text(value, lang.as_deref()),
            Self::Typed { value, datatype } => sparql::escape_typed(value, datatype),
        }
    }
}

/// A single (subject, predicate, object) statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fact {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Fact {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }

    /// Serialize as a triple pattern without the trailing dot.
    pub fn to_statement(&self) -> String {
        format!(
            "{} {} {}",
            sparql::escape_iri(&self.subject),
            sparql::escape_iri(&self.predicate),
            self.object.to_sparql()
        )
    }
}

/// Organization identifier used as the partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    /// Normalize a raw identifier: full references are reduced to their last
    /// path segment. Returns `None` when nothing usable remains.
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_end_matches(['/', '#']);
        let segment = trimmed
            .rsplit(['/', '#'])
            .next()
            .unwrap_or(trimmed)
            .trim();
        if segment.is_empty() {
            None
        } else {
            Some(Self(segment.to_string()))
        }
    }

    /// Resolve the organization from the bindings of a result row.
    ///
    /// A `mu:uuid` literal wins over the organization reference.
    pub fn resolve(uuid: Option<&Term>, reference: Option<&Term>) -> Option<Self> {
        let from_uuid = uuid
            .filter(|t| !matches!(t, Term::Iri(_)))
            .and_then(|t| Self::normalize(t.lexical()));
        from_uuid.or_else(|| reference.and_then(Term::as_iri).and_then(Self::normalize))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fact together with the organization it is replicated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedFact {
    pub org: OrgId,
    pub fact: Fact,
}

impl AttributedFact {
    pub fn new(org: OrgId, fact: Fact) -> Self {
        Self { org, fact }
    }
}
