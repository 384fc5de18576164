//! Crafting service
//!
//! Answers material listings and recipe lookups from a shared [`RecipeTable`].

use std::convert::Infallible;
use std::sync::Arc;

use super::{RecipeTable, ServiceError, ServiceResult};
use crate::dispatch::{DispatchResult, Dispatcher};
use crate::protocol::{
    MaterialRequest, MaterialRequestReply, RecipeCreateReply, RecipeCreateRequest, Registry,
};

/// Handlers of the crafting service
#[derive(Debug, Clone)]
pub struct Atelier {
    recipes: Arc<RecipeTable>,
}

impl Atelier {
    pub fn new(recipes: Arc<RecipeTable>) -> Self {
        Self { recipes }
    }

    /// List the distinct materials of each recipe column
    pub fn materials(&self, _request: MaterialRequest) -> MaterialRequestReply {
        let (material1, material2) = self.recipes.materials();
        MaterialRequestReply {
            material1,
            material2,
        }
    }

    /// Combine the two materials of a `"m1,m2"` request
    pub fn craft(&self, request: RecipeCreateRequest) -> ServiceResult<RecipeCreateReply> {
        let (material1, material2) = request.materials.split_once(',').ok_or_else(|| {
            ServiceError::InvalidRequest(format!(
                "expected two materials separated by a comma, got '{}'",
                request.materials
            ))
        })?;

        let result = self.recipes.lookup(material1, material2)?;
        tracing::info!("Crafted '{}' with '{}'", material1, material2);

        Ok(RecipeCreateReply {
            result: result.to_string(),
        })
    }
}

/// Dispatcher serving [`MaterialRequest`] and [`RecipeCreateRequest`]
pub fn atelier_dispatcher(recipes: Arc<RecipeTable>) -> DispatchResult<Dispatcher> {
    let atelier = Atelier::new(recipes);
    let lister = atelier.clone();

    let mut dispatcher = Dispatcher::new(Registry::atelier());
    dispatcher
        .on(move |request: MaterialRequest| Ok::<_, Infallible>(lister.materials(request)))?
        .on(move |request: RecipeCreateRequest| atelier.craft(request))?;
    Ok(dispatcher)
}
