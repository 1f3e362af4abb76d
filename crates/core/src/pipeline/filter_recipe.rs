use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filtering::domain::face_filter::{FaceFilter, FilterError};
use crate::pipeline::frame_stage::{standard_stages, FrameStage};
use crate::shared::constants::{
    APP_DIR_NAME, DEFAULT_CONFIDENCE, DEFAULT_MAX_FACES, RECIPE_FILE_NAME,
};

#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("cannot read recipe {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse recipe {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot save recipe {path}: {message}")]
    Write { path: PathBuf, message: String },
    #[error("confidence must be within 0.0-1.0, got {0}")]
    Confidence(f64),
    #[error("max_faces must be at least 1")]
    MaxFaces,
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// A reusable list of filters applied to every detected face, plus
/// detector settings.
///
/// ```json
/// {
///   "filters": [{ "kind": "blur", "radius": 12.0 }, { "kind": "outline", "color": "#ffffff", "width": 3 }],
///   "color_pop": false,
///   "confidence": 0.5,
///   "max_faces": 5
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRecipe {
    pub filters: Vec<FaceFilter>,
    pub color_pop: bool,
    pub confidence: f64,
    pub max_faces: usize,
}

impl Default for FilterRecipe {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            color_pop: false,
            confidence: DEFAULT_CONFIDENCE,
            max_faces: DEFAULT_MAX_FACES,
        }
    }
}

impl FilterRecipe {
    /// `<config dir>/ShakeFace/recipe.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(RECIPE_FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let json = fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let recipe: Self = serde_json::from_str(&json).map_err(|source| RecipeError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        recipe.validate()?;
        log::debug!("Loaded recipe {} ({} filter(s))", path.display(), recipe.filters.len());
        Ok(recipe)
    }

    /// The user's saved recipe if one exists, otherwise the defaults.
    pub fn load_default() -> Result<Self, RecipeError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), RecipeError> {
        let write_err = |message: String| RecipeError::Write {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        fs::write(path, json).map_err(|e| write_err(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), RecipeError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(RecipeError::Confidence(self.confidence));
        }
        if self.max_faces == 0 {
            return Err(RecipeError::MaxFaces);
        }
        for filter in &self.filters {
            filter.validate()?;
        }
        Ok(())
    }

    /// Per-frame stages that apply this recipe.
    pub fn stages(&self) -> Vec<Box<dyn FrameStage>> {
        standard_stages(self.filters.clone(), self.color_pop)
    }
}
