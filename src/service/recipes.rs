//! Recipe store
//!
//! An immutable table of crafting recipes, either the built-in set or rows
//! loaded from a TOML file. The table is built once at startup and shared
//! read-only with the handlers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::protocol::RecipeRow;

const FIREWORKS: &str = r#"
                          ,
                       \  :  /
                    `. __/ \__ .'
                    _ _\     /_ _
                       /_   _\
                     .'  \ /  `.
                       /  :  \
                          '
          ,                               ,
       \  :  /                         \  :  /
    `. __/ \__ .'                   `. __/ \__ .'
    _ _\     /_ _                   _ _\     /_ _
       /_   _\                         /_   _\
     .'  \ /  `.                     .'  \ /  `.
       /  :  \                         /  :  \
          '                               '
"#;

const EXPLOSION: &str = r#"
                                 :
                       !H.     :H       .:          :
                       .H.     ! .                 :
                .        oH.  oo ooo.. :
                 !!..    ooooooooooooHH.     !.:
  :                 H:ooooooooooooooooo  :.H                   .
         ..     .   .oooooooooooooooooo.:oH:.
            :.! . .oooooooooooooooooooooo!::!   .  .: :
               .: oooooooooooooooooooIooo! :!!:::
                 oooooooooooooooMooooooooHH!H:
                .ooooooooooooooooooooOII!! !o o
   :  :  :  H   IooooooooooooooWoooooMoHoIoH!.:H! .::          .   .
                 ooooooooooooooooooOooOH!!oH: ...
                  .oooooooHoooOoooOooIoooHHIH:.
                .H .::oo!ooIIOOOooIoIIoH!.::::I.: .
            .   .    :o:Ooo:HOoHIIHHoHHoIH::  . . .!.
     .            . .!H!: oHI!o!oooooo!!oHH..         :!   .
                   : !.  .:.H.:!:!!.!H: ...H               .
                 ! .    .!:   :: ::  !H     .:..
                                H.       .
                               :
"#;

const RESET: &str = "\x1b[0m";

/// Recipe store errors
#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Recipe file contains no recipes: {0}")]
    Empty(PathBuf),
}

pub type RecipeResult<T> = Result<T, RecipeError>;

/// Lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No recipe combines '{0}' with '{1}'")]
    NotFound(String, String),

    #[error("{count} recipes combine '{material1}' with '{material2}'")]
    Ambiguous {
        material1: String,
        material2: String,
        count: usize,
    },
}

/// On-disk layout of a recipe file: a list of `[[recipe]]` tables
#[derive(Debug, Default, Serialize, Deserialize)]
struct RecipeFile {
    #[serde(default, rename = "recipe")]
    recipes: Vec<RecipeRow>,
}

/// Immutable table of recipes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeTable {
    rows: Vec<RecipeRow>,
}

impl RecipeTable {
    pub fn new(rows: Vec<RecipeRow>) -> Self {
        Self { rows }
    }

    /// The recipes shipped with the atelier
    pub fn builtin() -> Self {
        let colors = [("red", "31"), ("green", "32"), ("blue", "34")];
        let mut rows = Vec::with_capacity(colors.len() * 2);

        for (color, code) in colors {
            rows.push(row(
                "sparkling powder",
                color,
                &format!(
                    "{} fireworks are surely look nice, but please launch it outside.\x1b[0;{}m{}{}",
                    capitalize(color),
                    code,
                    FIREWORKS,
                    RESET
                ),
            ));
        }

        for (color, code) in colors {
            rows.push(row(
                "explosive powder",
                color,
                &format!(
                    "As soon as you crafted item, you saw a bright {} explosion, \
                     powerfull enough to kick you out of the store.\x1b[0;{}m{}{}",
                    color, code, EXPLOSION, RESET
                ),
            ));
        }

        Self { rows }
    }

    /// Load recipes from a TOML file
    pub fn load(path: &Path) -> RecipeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: RecipeFile = toml::from_str(&contents)?;

        if file.recipes.is_empty() {
            return Err(RecipeError::Empty(path.to_path_buf()));
        }

        tracing::info!("Loaded {} recipes from {}", file.recipes.len(), path.display());
        Ok(Self::new(file.recipes))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Distinct values of the first and second material columns
    pub fn materials(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        let material1 = self.rows.iter().map(|r| r.material1.clone()).collect();
        let material2 = self.rows.iter().map(|r| r.material2.clone()).collect();
        (material1, material2)
    }

    /// Find the result of combining two materials, in that order
    pub fn lookup(&self, material1: &str, material2: &str) -> Result<&str, LookupError> {
        let mut matches = self
            .rows
            .iter()
            .filter(|r| r.material1 == material1 && r.material2 == material2);

        match (matches.next(), matches.count()) {
            (None, _) => Err(LookupError::NotFound(
                material1.to_string(),
                material2.to_string(),
            )),
            (Some(found), 0) => Ok(found.result.as_str()),
            (Some(_), extra) => Err(LookupError::Ambiguous {
                material1: material1.to_string(),
                material2: material2.to_string(),
                count: extra + 1,
            }),
        }
    }
}

fn row(material1: &str, color: &str, result: &str) -> RecipeRow {
    RecipeRow {
        material1: material1.to_string(),
        material2: format!("{} dye", color),
        result: result.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
