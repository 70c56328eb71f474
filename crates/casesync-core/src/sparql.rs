//! SPARQL query construction.
//!
//! Queries are assembled from fixed graph patterns plus typed parameters
//! (timestamps, IRI lists, graph names). Parameters are always escaped here,
//! never interpolated raw by callers.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Namespaces of the permit vocabulary.
pub mod ns {
    pub const DCT: &str = "http://purl.org/dc/terms/";
    pub const DBPEDIA: &str = "http://dbpedia.org/ontology/";
    pub const OMGEVING: &str = "https://data.vlaanderen.be/ns/omgevingsvergunning#";
    pub const MU: &str = "http://mu.semte.ch/vocabularies/core/";
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

    /// Record -> Submission link predicate.
    pub const ZAAKHANDELING: &str = "https://data.vlaanderen.be/ns/omgevingsvergunning#zaakhandeling";
    pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
}

const PREFIXES: &str = "PREFIX dct: <http://purl.org/dc/terms/>
PREFIX dbpedia: <http://dbpedia.org/ontology/>
PREFIX omgeving: <https://data.vlaanderen.be/ns/omgevingsvergunning#>
PREFIX mu: <http://mu.semte.ch/vocabularies/core/>
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>
";

/// Escape an IRI as `<...>`, percent-encoding characters IRIREF forbids.
pub fn escape_iri(iri: &str) -> String {
    let mut out = String::with_capacity(iri.len() + 2);
    out.push('<');
    for c in iri.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' => {
                out.push_str(&format!("%{:02X}", c as u32));
            }
            c if (c as u32) <= 0x20 => out.push_str(&format!("%{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('>');
    out
}

/// Escape a string as a quoted SPARQL literal body.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Plain text literal with an optional language tag.
pub fn escape_text(value: &str, lang: Option<&str>) -> String {
    match lang {
        Some(lang) => format!("{}@{}", escape_string(value), lang),
        None => escape_string(value),
    }
}

/// Literal with an explicit datatype.
pub fn escape_typed(value: &str, datatype: &str) -> String {
    format!("{}^^{}", escape_string(value), escape_iri(datatype))
}

/// `xsd:dateTime` literal for a UTC timestamp.
pub fn escape_datetime(at: DateTime<Utc>) -> String {
    escape_typed(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true), ns::XSD_DATE_TIME)
}

/// Whether `tag` is a well-formed BCP47-ish language tag (`LANGTAG` production).
pub fn is_valid_lang(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let first_ok = parts
        .next()
        .map(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);
    first_ok && parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// A complete SELECT query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparqlQuery(String);

impl SparqlQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SparqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A complete update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparqlUpdate(String);

impl SparqlUpdate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SparqlUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which graphs a query reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphScope {
    /// Any graph, bound to `?g`.
    Any,
    /// A single named graph.
    Named(String),
}

impl GraphScope {
    fn clause(&self) -> String {
        match self {
            Self::Any => "GRAPH ?g".to_string(),
            Self::Named(graph) => format!("GRAPH {}", escape_iri(graph)),
        }
    }
}

/// Builder for SELECT queries over a single graph scope.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    distinct: bool,
    projection: Vec<&'static str>,
    scope: GraphScope,
    values: Option<(&'static str, Vec<String>)>,
    patterns: Vec<String>,
    order_by: Vec<&'static str>,
    limit: Option<usize>,
}

impl SelectBuilder {
    pub fn new(projection: &[&'static str]) -> Self {
        Self {
            distinct: false,
            projection: projection.to_vec(),
            scope: GraphScope::Any,
            values: None,
            patterns: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn scope(mut self, scope: &GraphScope) -> Self {
        self.scope = scope.clone();
        self
    }

    /// Restrict `?var` to the given IRIs.
    pub fn values_iris<S: AsRef<str>>(mut self, var: &'static str, iris: &[S]) -> Self {
        let escaped = iris.iter().map(|i| escape_iri(i.as_ref())).collect();
        self.values = Some((var, escaped));
        self
    }

    /// Append a fixed graph pattern.
    pub fn pattern(mut self, pattern: &'static str) -> Self {
        self.patterns.push(pattern.to_string());
        self
    }

    /// `FILTER(?var > "<at>"^^xsd:dateTime)`
    pub fn filter_after(mut self, var: &'static str, at: DateTime<Utc>) -> Self {
        self.patterns
            .push(format!("FILTER(?{} > {})", var, escape_datetime(at)));
        self
    }

    /// `FILTER(STRSTARTS(STR(?var), "<prefix>"))`
    pub fn filter_prefix(mut self, var: &'static str, prefix: &str) -> Self {
        self.patterns.push(format!(
            "FILTER(STRSTARTS(STR(?{}), {}))",
            var,
            escape_string(prefix)
        ));
        self
    }

    pub fn order_by(mut self, key: &'static str) -> Self {
        self.order_by.push(key);
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn build(self) -> SparqlQuery {
        let mut q = String::from(PREFIXES);
        q.push_str("SELECT ");
        if self.distinct {
            q.push_str("DISTINCT ");
        }
        let vars: Vec<String> = self.projection.iter().map(|v| format!("?{}", v)).collect();
        q.push_str(&vars.join(" "));
        q.push_str(" WHERE {\n  ");
        q.push_str(&self.scope.clause());
        q.push_str(" {\n");
        if let Some((var, iris)) = &self.values {
            q.push_str(&format!("    VALUES ?{} {{ {} }}\n", var, iris.join(" ")));
        }
        for pattern in &self.patterns {
            for line in pattern.lines() {
                q.push_str("    ");
                q.push_str(line.trim_end());
                q.push('\n');
            }
        }
        q.push_str("  }\n}");
        if !self.order_by.is_empty() {
            q.push_str("\nORDER BY ");
            q.push_str(&self.order_by.join(" "));
        }
        if let Some(limit) = self.limit {
            q.push_str(&format!("\nLIMIT {}", limit));
        }
        SparqlQuery(q)
    }
}

/// An `INSERT DATA` request scoped to one destination graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertData {
    pub graph: String,
    pub statements: Vec<String>,
}

impl InsertData {
    pub fn new(graph: impl Into<String>, statements: Vec<String>) -> Self {
        Self {
            graph: graph.into(),
            statements,
        }
    }

    pub fn to_update(&self) -> SparqlUpdate {
        let body: Vec<String> = self
            .statements
            .iter()
            .map(|s| format!("    {} .", s))
            .collect();
        SparqlUpdate(format!(
            "INSERT DATA {{\n  GRAPH {} {{\n{}\n  }}\n}}",
            escape_iri(&self.graph),
            body.join("\n")
        ))
    }
}
