//! Work queue construction.
//!
//! Turns two ordered path lists into the ordered sequence of work items the controller consumes.
//! Paths are not deduplicated or checked for existence here; that happens at execution time so
//! failures are attributed to a specific pipeline stage.

use crate::error::QueueError;
use crate::model::{WorkItem, WorkQueue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How script and scene lists are combined into work items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Pairing {
    /// Item i pairs script i with scene i; the shorter list defines the run length.
    #[default]
    Positional,
    /// Every script on every scene, grouped by scene.
    CrossProduct,
    /// Positional, but lists of different length are rejected.
    Strict,
}

impl WorkQueue {
    /// Pair scripts and scenes by position. Pure and total: empty input gives an empty queue.
    pub fn build(scripts: &[PathBuf], scenes: &[PathBuf], save_after: bool) -> WorkQueue {
        let items = scripts
            .iter()
            .zip(scenes.iter())
            .map(|(script, scene)| WorkItem::new(script.clone(), scene.clone(), save_after))
            .collect();
        WorkQueue::from_items(items)
    }
}

/// Build a queue under an explicit pairing policy.
pub fn build_with(
    pairing: Pairing,
    scripts: &[PathBuf],
    scenes: &[PathBuf],
    save_after: bool,
) -> Result<WorkQueue, QueueError> {
    if scripts.is_empty() || scenes.is_empty() {
        return Err(QueueError::Empty);
    }
    match pairing {
        Pairing::Positional => Ok(WorkQueue::build(scripts, scenes, save_after)),
        Pairing::Strict => {
            if scripts.len() != scenes.len() {
                return Err(QueueError::LengthMismatch {
                    scripts: scripts.len(),
                    scenes: scenes.len(),
                });
            }
            Ok(WorkQueue::build(scripts, scenes, save_after))
        }
        Pairing::CrossProduct => Ok(cross_product(scripts, scenes, save_after)),
    }
}

/// Scene-major cross product: the scene is loaded once, every script runs against it, and it is
/// saved once after the last script.
fn cross_product(scripts: &[PathBuf], scenes: &[PathBuf], save_after: bool) -> WorkQueue {
    let mut items = Vec::with_capacity(scripts.len() * scenes.len());
    for scene in scenes {
        for (i, script) in scripts.iter().enumerate() {
            let last = i + 1 == scripts.len();
            items.push(WorkItem {
                script: script.clone(),
                scene: scene.clone(),
                save_after: save_after && last,
                reuse_scene: i > 0,
            });
        }
    }
    WorkQueue::from_items(items)
}
