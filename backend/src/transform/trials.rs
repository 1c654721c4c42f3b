//! Assemble selected scenes into a trial file.
//!
//! ```text
//! scenes [A, B] × repeat 2        shuffle (optional)      numbered trials
//! ┌───────────────┐              ┌───────────────┐       ┌──────────────────────────┐
//! │ A B A B       │  ──────────▶ │ B A A B       │ ────▶ │ 1 B, 2 A, 3 A, 4 B       │
//! └───────────────┘              └───────────────┘       └──────────────────────────┘
//! ```
//!
//! Each trial gets a 1-based `trialNum` and a `trialName` taken from the
//! scene's name field (else `Scene {trialNum}`); the name field itself is
//! dropped from the trial, every other scene field is copied as is.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::{SceneRecord, TrialEntry, TrialFile};

/// Options for [`assemble`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrialOptions {
    /// How many times the scene list is repeated. Must be at least 1.
    pub repeat_count: usize,
    /// Randomize trial order.
    pub shuffle: bool,
    /// Scene field used as the trial name.
    pub scene_name_key: String,
}

impl Default for TrialOptions {
    fn default() -> Self {
        Self {
            repeat_count: 1,
            shuffle: false,
            scene_name_key: "sceneName".to_string(),
        }
    }
}

/// Build a trial file using the thread-local RNG for shuffling.
///
/// # Panics
/// Panics if `options.repeat_count` is 0.
pub fn assemble(scenes: &[SceneRecord], options: &TrialOptions) -> TrialFile {
    assemble_with_rng(scenes, options, &mut rand::thread_rng())
}

/// Build a trial file, shuffling with `rng` when requested.
///
/// # Panics
/// Panics if `options.repeat_count` is 0.
pub fn assemble_with_rng<R: Rng + ?Sized>(
    scenes: &[SceneRecord],
    options: &TrialOptions,
    rng: &mut R,
) -> TrialFile {
    assert!(options.repeat_count >= 1, "repeat_count must be at least 1");

    let mut order: Vec<&SceneRecord> = scenes
        .iter()
        .cycle()
        .take(scenes.len() * options.repeat_count)
        .collect();

    if options.shuffle {
        order.shuffle(rng);
    }

    let trials = order
        .into_iter()
        .enumerate()
        .map(|(i, scene)| to_trial(scene, i + 1, &options.scene_name_key))
        .collect();

    TrialFile { trials }
}

fn to_trial(scene: &SceneRecord, trial_num: usize, name_key: &str) -> TrialEntry {
    let trial_name = scene.display_name(name_key, trial_num);

    let mut fields = scene.fields.clone();
    fields.shift_remove(name_key);

    TrialEntry {
        trial_num,
        trial_name,
        fields,
        objects: scene.objects.clone(),
    }
}
