//! Service module - The demo services built on the dispatcher
//!
//! Provides:
//! - `upper`: converts text to upper case
//! - `atelier`: lists crafting materials and looks up recipes

mod atelier;
mod recipes;
mod upper;

pub use atelier::*;
pub use recipes::*;
pub use upper::*;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::dispatch::{DispatchResult, Dispatcher};
use crate::protocol::Registry;

/// Errors raised by service handlers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    Lookup(#[from] LookupError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Which service a server runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Upper-case text
    Upper,
    /// Crafting recipes
    Atelier,
}

impl ServiceKind {
    /// Messages this service can reconstruct
    pub fn registry(self) -> Registry {
        match self {
            ServiceKind::Upper => Registry::upper(),
            ServiceKind::Atelier => Registry::atelier(),
        }
    }

    /// Build the dispatcher for this service
    pub fn dispatcher(self, recipes: Arc<RecipeTable>) -> DispatchResult<Dispatcher> {
        match self {
            ServiceKind::Upper => upper_dispatcher(),
            ServiceKind::Atelier => atelier_dispatcher(recipes),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Upper => write!(f, "upper"),
            ServiceKind::Atelier => write!(f, "atelier"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;

    #[test]
    fn test_dispatchers_cover_their_requests() {
        let recipes = Arc::new(RecipeTable::builtin());

        let upper = ServiceKind::Upper.dispatcher(recipes.clone()).unwrap();
        assert!(upper.handles(MessageKind::UpperRequest));
        assert!(!upper.handles(MessageKind::MaterialRequest));

        let atelier = ServiceKind::Atelier.dispatcher(recipes).unwrap();
        assert!(atelier.handles(MessageKind::MaterialRequest));
        assert!(atelier.handles(MessageKind::RecipeCreateRequest));
        assert!(!atelier.handles(MessageKind::RecipeRow));
        assert_eq!(atelier.registry(), ServiceKind::Atelier.registry());
    }

    #[test]
    fn test_lookup_error_message_passes_through() {
        let err: ServiceError = LookupError::NotFound("a".to_string(), "b".to_string()).into();
        assert_eq!(err.to_string(), "No recipe combines 'a' with 'b'");
    }
}
