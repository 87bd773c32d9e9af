//! Gene set annotations and gene scores supplied to a run.
//!
//! The core only ever reads these: pruning an index to the genes that carry scores
//! produces a new [`GeneSetIndex`] rather than mutating the original.

use serde::{Deserialize, Serialize};

pub mod annotations;
pub mod scores;

pub use annotations::{GeneSetIndex, GeneSetIndexBuilder};
pub use scores::{ElementScores, GeneScores, ScoreTransform};

/// Category a gene set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Aspect {
    BiologicalProcess,
    MolecularFunction,
    CellularComponent,
    UserDefined,
    /// Aggregate or root category; never scored
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneSetTerm {
    pub id: String,
    pub name: String,
    pub aspect: Aspect,
}

impl GeneSetTerm {
    pub fn new(id: impl Into<String>, name: impl Into<String>, aspect: Aspect) -> Self {
        GeneSetTerm {
            id: id.into(),
            name: name.into(),
            aspect,
        }
    }

    /// A user-defined term whose display name is its identifier
    pub fn user_defined(id: impl Into<String>) -> Self {
        let id = id.into();
        GeneSetTerm {
            name: id.clone(),
            id,
            aspect: Aspect::UserDefined,
        }
    }
}
