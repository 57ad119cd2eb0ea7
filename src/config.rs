use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derivative::Derivative;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::chess::EngineSettings;
use crate::error::{Error, Result};

const MAX_SKILL_LEVEL: u8 = 20;

/// Trainer settings, read from a JSON file. Missing keys take their defaults.
#[derive(Deserialize, Serialize, Debug, Clone, Derivative, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
#[derivative(Default)]
pub struct TrainerConfig {
    /// UCI engine binary. Without one there are no evaluations and engine
    /// moves stay pending.
    pub engine_path: Option<PathBuf>,
    #[derivative(Default(value = "10"))]
    pub skill_level: u8,
    #[derivative(Default(value = "10"))]
    pub eval_depth: u32,
    #[derivative(Default(value = "15"))]
    pub move_depth: u32,
    /// Pause before a computer move is shown.
    #[derivative(Default(value = "500"))]
    pub move_delay_ms: u64,
    #[derivative(Default(value = "PathBuf::from(\"custom_lines.json\")"))]
    pub store_path: PathBuf,
    pub show_hints: bool,
}

impl TrainerConfig {
    /// Load from `path`. A missing file gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.skill_level > MAX_SKILL_LEVEL {
            warn!(
                "Skill level {} out of range, using {}",
                self.skill_level, MAX_SKILL_LEVEL
            );
            self.skill_level = MAX_SKILL_LEVEL;
        }
        self.eval_depth = self.eval_depth.max(1);
        self.move_depth = self.move_depth.max(1);
        self
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            skill_level: self.skill_level,
            eval_depth: self.eval_depth,
            move_depth: self.move_depth,
        }
    }

    pub fn move_delay(&self) -> Duration {
        Duration::from_millis(self.move_delay_ms)
    }
}
