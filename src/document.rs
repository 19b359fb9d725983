//! Document model carried by the document protocol.
//!
//! Documents are addressed by a [`DocumentId`] of the form
//! `id:<namespace>:<type>:<modifier>:<local>`, where the modifier is either empty,
//! `n=<number>` or `g=<group>`. Field values are kept as plain strings; this layer
//! only moves them around and never interprets them.
//!
//! # Example
//! ```rust
//! use docbus::document::DocumentId;
//!
//! let id: DocumentId = "id:music:song:n=12:hey-jude".parse().unwrap();
//! assert_eq!(id.namespace(), "music");
//! assert_eq!(id.to_string(), "id:music:song:n=12:hey-jude");
//! ```
use std::{collections::BTreeMap, fmt, str::FromStr};

use bincode::{Decode, Encode};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentIdError {
    #[error("document id '{0}' must start with 'id:'")]
    Scheme(String),

    #[error("document id '{id}' is missing its {part}")]
    Missing { id: String, part: &'static str },

    #[error("document id '{id}' has an invalid modifier '{modifier}'")]
    Modifier { id: String, modifier: String },
}

/// Location hint embedded in a document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub enum Location {
    Number(u64),
    Group(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct DocumentId {
    namespace: String,
    doc_type: String,
    location: Option<Location>,
    local: String,
}

impl DocumentId {
    pub fn new(namespace: &str, doc_type: &str, local: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            doc_type: doc_type.to_string(),
            location: None,
            local: local.to_string(),
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    /// The placeholder id of an empty message shell.
    pub fn is_null(&self) -> bool {
        self.namespace.is_empty() && self.doc_type.is_empty() && self.local.is_empty()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "null::");
        }
        let modifier = match &self.location {
            Some(Location::Number(n)) => format!("n={n}"),
            Some(Location::Group(g)) => format!("g={g}"),
            None => String::new(),
        };
        write!(
            f,
            "id:{}:{}:{}:{}",
            self.namespace, self.doc_type, modifier, self.local
        )
    }
}

impl FromStr for DocumentId {
    type Err = DocumentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("id:")
            .ok_or_else(|| DocumentIdError::Scheme(s.to_string()))?;

        // The local part may itself contain ':', so only split off the first three.
        let mut parts = rest.splitn(4, ':');
        let mut next = |part: &'static str| {
            parts.next().ok_or_else(|| DocumentIdError::Missing {
                id: s.to_string(),
                part,
            })
        };
        let namespace = next("namespace")?;
        let doc_type = next("document type")?;
        let modifier = next("modifier")?;
        let local = next("local part")?;

        for (value, part) in [(namespace, "namespace"), (doc_type, "document type"), (local, "local part")] {
            if value.is_empty() {
                return Err(DocumentIdError::Missing {
                    id: s.to_string(),
                    part,
                });
            }
        }

        let location = match modifier.split_once('=') {
            None if modifier.is_empty() => None,
            Some(("n", n)) => Some(Location::Number(n.parse().map_err(|_| {
                DocumentIdError::Modifier {
                    id: s.to_string(),
                    modifier: modifier.to_string(),
                }
            })?)),
            Some(("g", g)) if !g.is_empty() => Some(Location::Group(g.to_string())),
            _ => {
                return Err(DocumentIdError::Modifier {
                    id: s.to_string(),
                    modifier: modifier.to_string(),
                });
            }
        };

        Ok(Self {
            namespace: namespace.to_string(),
            doc_type: doc_type.to_string(),
            location,
            local: local.to_string(),
        })
    }
}

/// A document as it travels through the bus: an id and its string fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Document {
    pub id: DocumentId,
    pub fields: BTreeMap<String, String>,
}

impl Document {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}

/// Partial modification of an existing document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct DocumentUpdate {
    pub id: DocumentId,
    pub assignments: BTreeMap<String, String>,
    pub removals: Vec<String>,
    /// Create an empty document first when the target does not exist.
    pub create_if_missing: bool,
}

impl DocumentUpdate {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Applies assignments, then removals.
    pub fn apply(&self, document: &mut Document) {
        for (name, value) in &self.assignments {
            document.fields.insert(name.clone(), value.clone());
        }
        for name in &self.removals {
            document.fields.remove(name);
        }
    }
}
