//! Message registry
//!
//! A registry is the closed set of message kinds a peer is willing to
//! reconstruct from the wire, together with the namespaces it accepts. Any tag
//! outside that set is rejected before a message is built.

use thiserror::Error;

use super::{MessageKind, LOCAL_NAMESPACE, RECIPE_NAMESPACE};

/// Registry lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("namespace '{0}' is not allowed")]
    DisallowedNamespace(String),

    #[error("no message named '{type_name}' in namespace '{namespace}'")]
    NotFound { type_name: String, namespace: String },
}

/// Closed mapping from (type-name, namespace) to a message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registry {
    namespaces: &'static [&'static str],
    kinds: &'static [MessageKind],
}

const UPPER_NAMESPACES: &[&str] = &[LOCAL_NAMESPACE];

const UPPER_KINDS: &[MessageKind] = &[
    MessageKind::UpperRequest,
    MessageKind::UpperReply,
    MessageKind::ServiceException,
];

const ATELIER_NAMESPACES: &[&str] = &[LOCAL_NAMESPACE, RECIPE_NAMESPACE];

const ATELIER_KINDS: &[MessageKind] = &[
    MessageKind::MaterialRequest,
    MessageKind::MaterialRequestReply,
    MessageKind::RecipeCreateRequest,
    MessageKind::RecipeCreateReply,
    MessageKind::RecipeRow,
    MessageKind::ServiceException,
];

impl Registry {
    /// Create a registry from an allow-list of namespaces and a set of kinds
    pub const fn new(namespaces: &'static [&'static str], kinds: &'static [MessageKind]) -> Self {
        Self { namespaces, kinds }
    }

    /// Messages understood by the upper-casing service
    pub const fn upper() -> Self {
        Self::new(UPPER_NAMESPACES, UPPER_KINDS)
    }

    /// Messages understood by the crafting service
    pub const fn atelier() -> Self {
        Self::new(ATELIER_NAMESPACES, ATELIER_KINDS)
    }

    /// Resolve an envelope tag to a known message kind
    pub fn resolve(&self, type_name: &str, namespace: &str) -> Result<MessageKind, ResolveError> {
        if !self.allows_namespace(namespace) {
            return Err(ResolveError::DisallowedNamespace(namespace.to_string()));
        }

        self.kinds
            .iter()
            .copied()
            .find(|kind| kind.type_name() == type_name && kind.namespace() == namespace)
            .ok_or_else(|| ResolveError::NotFound {
                type_name: type_name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    /// Check if the namespace is on the allow-list
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains(&namespace)
    }

    /// Check if the kind can be reconstructed by this registry
    pub fn contains(&self, kind: MessageKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Kinds known to this registry
    pub fn kinds(&self) -> &'static [MessageKind] {
        self.kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_every_registered_kind() {
        for registry in [Registry::upper(), Registry::atelier()] {
            for &kind in registry.kinds() {
                assert_eq!(registry.resolve(kind.type_name(), kind.namespace()), Ok(kind));
            }
        }
    }

    #[test]
    fn test_rejects_foreign_namespace() {
        let err = Registry::atelier()
            .resolve("UpperRequest", "os")
            .unwrap_err();
        assert_eq!(err, ResolveError::DisallowedNamespace("os".to_string()));
    }

    #[test]
    fn test_namespace_checked_before_type_name() {
        // A known type name under a foreign namespace is still a namespace rejection
        let err = Registry::upper()
            .resolve("UpperRequest", "subprocess")
            .unwrap_err();
        assert!(matches!(err, ResolveError::DisallowedNamespace(_)));
    }

    #[test]
    fn test_no_prefix_matching() {
        let err = Registry::atelier()
            .resolve("RecipeRow", "recipes.engine")
            .unwrap_err();
        assert!(matches!(err, ResolveError::DisallowedNamespace(_)));
    }

    #[test]
    fn test_unknown_type_in_allowed_namespace() {
        let err = Registry::upper().resolve("Popen", LOCAL_NAMESPACE).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn test_services_do_not_share_kinds() {
        assert!(Registry::upper().resolve("MaterialRequest", LOCAL_NAMESPACE).is_err());
        assert!(Registry::atelier().resolve("UpperRequest", LOCAL_NAMESPACE).is_err());
        assert!(!Registry::upper().allows_namespace(RECIPE_NAMESPACE));
    }

    #[test]
    fn test_type_name_must_match_namespace() {
        // RecipeRow lives in the recipes namespace only
        let err = Registry::atelier()
            .resolve("RecipeRow", LOCAL_NAMESPACE)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }
}
