//! Type-code registry.
//!
//! A [`Protocol`] maps type codes to factories that build empty message or reply
//! shells, and maps each message code to the code of its reply. A
//! [`TypeRegistry`] groups protocols by name.
//!
//! The process-wide registry is built once through [`init`] and is read-only
//! afterwards, so lookups from any number of threads need no locking.
//!
//! # Example
//! ```rust
//! use docbus::protocol::{documents, registry};
//!
//! let registry = registry::init().unwrap();
//! let reply = registry
//!     .paired_reply_code(documents::DOCUMENT_PROTOCOL, documents::MESSAGE_REMOVEDOCUMENT)
//!     .unwrap();
//! assert_eq!(reply, documents::REPLY_REMOVEDOCUMENT);
//! ```
use std::collections::{BTreeMap, HashMap};

use log::debug;
use once_cell::sync::OnceCell;
use thiserror::Error;

use super::{Message, Reply, TypeCode, documents};

pub type MessageFactory = fn() -> Box<dyn Message>;
pub type ReplyFactory = fn() -> Box<dyn Reply>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("unknown type code {type_code} in protocol '{protocol}'")]
    UnknownType { protocol: String, type_code: TypeCode },

    #[error("type code {type_code} is already registered in protocol '{protocol}'")]
    DuplicateType { protocol: String, type_code: TypeCode },

    #[error("protocol '{0}' is already registered")]
    DuplicateProtocol(String),

    #[error("message type {type_code} in protocol '{protocol}' has no paired reply")]
    Unpaired { protocol: String, type_code: TypeCode },

    #[error("message type {request} in protocol '{protocol}' is paired with {reply}, which is not a reply type")]
    InvalidPairing {
        protocol: String,
        request: TypeCode,
        reply: TypeCode,
    },
}

/// Builds the empty shell of one registered type.
#[derive(Clone, Copy)]
pub enum Factory {
    Message(MessageFactory),
    Reply(ReplyFactory),
}

impl Factory {
    pub fn is_reply(&self) -> bool {
        matches!(self, Factory::Reply(_))
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Factory::Message(_) => write!(f, "Factory::Message"),
            Factory::Reply(_) => write!(f, "Factory::Reply"),
        }
    }
}

/// Named table of type codes.
#[derive(Debug)]
pub struct Protocol {
    name: String,
    factories: BTreeMap<TypeCode, Factory>,
    pairs: HashMap<TypeCode, TypeCode>,
}

impl Protocol {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            factories: BTreeMap::new(),
            pairs: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&mut self, type_code: TypeCode, factory: Factory) -> Result<(), RegistryError> {
        if self.factories.contains_key(&type_code) {
            return Err(RegistryError::DuplicateType {
                protocol: self.name.clone(),
                type_code,
            });
        }
        debug!(
            "registered {factory:?} for type {type_code} in protocol '{}'",
            self.name
        );
        self.factories.insert(type_code, factory);
        Ok(())
    }

    /// Registers a message type together with the reply type that answers it.
    pub fn register_pair(
        &mut self,
        request: TypeCode,
        reply: TypeCode,
        message: MessageFactory,
        reply_factory: ReplyFactory,
    ) -> Result<(), RegistryError> {
        if self.factories.contains_key(&reply) {
            return Err(RegistryError::DuplicateType {
                protocol: self.name.clone(),
                type_code: reply,
            });
        }
        self.register(request, Factory::Message(message))?;
        self.register(reply, Factory::Reply(reply_factory))?;
        self.pairs.insert(request, reply);
        Ok(())
    }

    pub fn lookup(&self, type_code: TypeCode) -> Result<Factory, RegistryError> {
        self.factories
            .get(&type_code)
            .copied()
            .ok_or_else(|| RegistryError::UnknownType {
                protocol: self.name.clone(),
                type_code,
            })
    }

    pub fn paired_reply_code(&self, request: TypeCode) -> Result<TypeCode, RegistryError> {
        self.pairs
            .get(&request)
            .copied()
            .ok_or_else(|| RegistryError::Unpaired {
                protocol: self.name.clone(),
                type_code: request,
            })
    }

    /// Builds the empty message shell for `type_code`.
    pub fn create_message(&self, type_code: TypeCode) -> Result<Box<dyn Message>, RegistryError> {
        match self.lookup(type_code)? {
            Factory::Message(create) => Ok(create()),
            Factory::Reply(_) => Err(RegistryError::UnknownType {
                protocol: self.name.clone(),
                type_code,
            }),
        }
    }

    /// Builds the empty reply shell for `type_code`.
    pub fn create_reply(&self, type_code: TypeCode) -> Result<Box<dyn Reply>, RegistryError> {
        match self.lookup(type_code)? {
            Factory::Reply(create) => Ok(create()),
            Factory::Message(_) => Err(RegistryError::UnknownType {
                protocol: self.name.clone(),
                type_code,
            }),
        }
    }

    /// Registered codes in ascending order.
    pub fn type_codes(&self) -> impl Iterator<Item = (TypeCode, Factory)> + '_ {
        self.factories.iter().map(|(code, factory)| (*code, *factory))
    }

    /// Checks that every message type is paired with a registered reply type.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (type_code, factory) in &self.factories {
            if factory.is_reply() {
                continue;
            }
            let reply = self.paired_reply_code(*type_code)?;
            if !matches!(self.factories.get(&reply), Some(Factory::Reply(_))) {
                return Err(RegistryError::InvalidPairing {
                    protocol: self.name.clone(),
                    request: *type_code,
                    reply,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    protocols: HashMap<String, Protocol>,
}

impl TypeRegistry {
    pub fn add_protocol(&mut self, protocol: Protocol) -> Result<(), RegistryError> {
        if self.protocols.contains_key(protocol.name()) {
            return Err(RegistryError::DuplicateProtocol(protocol.name().to_string()));
        }
        self.protocols.insert(protocol.name().to_string(), protocol);
        Ok(())
    }

    /// Registers a single type, creating the protocol on first use.
    pub fn register(
        &mut self,
        protocol: &str,
        type_code: TypeCode,
        factory: Factory,
    ) -> Result<(), RegistryError> {
        self.protocols
            .entry(protocol.to_string())
            .or_insert_with(|| Protocol::new(protocol))
            .register(type_code, factory)
    }

    pub fn register_pair(
        &mut self,
        protocol: &str,
        request: TypeCode,
        reply: TypeCode,
        message: MessageFactory,
        reply_factory: ReplyFactory,
    ) -> Result<(), RegistryError> {
        self.protocols
            .entry(protocol.to_string())
            .or_insert_with(|| Protocol::new(protocol))
            .register_pair(request, reply, message, reply_factory)
    }

    pub fn protocol(&self, name: &str) -> Result<&Protocol, RegistryError> {
        self.protocols
            .get(name)
            .ok_or_else(|| RegistryError::UnknownProtocol(name.to_string()))
    }

    pub fn protocols(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.values()
    }

    pub fn lookup(&self, protocol: &str, type_code: TypeCode) -> Result<Factory, RegistryError> {
        self.protocol(protocol)?.lookup(type_code)
    }

    pub fn paired_reply_code(
        &self,
        protocol: &str,
        request: TypeCode,
    ) -> Result<TypeCode, RegistryError> {
        self.protocol(protocol)?.paired_reply_code(request)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        self.protocols.values().try_for_each(Protocol::validate)
    }
}

static REGISTRY: OnceCell<TypeRegistry> = OnceCell::new();

/// Builds and validates the process-wide registry on first call.
///
/// A failure here is a configuration bug and should abort startup.
pub fn init() -> Result<&'static TypeRegistry, RegistryError> {
    REGISTRY.get_or_try_init(|| {
        let mut registry = TypeRegistry::default();
        registry.add_protocol(documents::document_protocol()?)?;
        registry.validate()?;
        Ok(registry)
    })
}

/// The process-wide registry, if [`init`] has completed.
pub fn global() -> Option<&'static TypeRegistry> {
    REGISTRY.get()
}
