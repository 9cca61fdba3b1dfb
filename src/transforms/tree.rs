use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::history::{HistoryLimits, LookupQuality, TransformHistory};
use super::pose::Pose;
use crate::error::{TransformError, TransformResult};
use crate::time::Time;

/// What to do when a sample names a different parent than the one already registered
/// for its child frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentPolicy {
    /// Keep the first parent and drop conflicting samples.
    #[default]
    Reject,
    /// Switch to the new parent and discard the old edge history.
    Reparent,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolved {
    pub pose: Pose,
    pub quality: LookupQuality,
}

#[derive(Debug, Default)]
struct FrameEntry {
    parent: Option<String>,
    /// Samples of this frame expressed in its parent.
    history: TransformHistory,
}

/// Forest of coordinate frames, each edge holding a time-ordered sample history.
#[derive(Debug, Default)]
pub struct TransformTree {
    frames: HashMap<String, FrameEntry>,
    policy: ParentPolicy,
    limits: HistoryLimits,
}

impl TransformTree {
    pub fn new() -> Self {
        Self::with_settings(ParentPolicy::default(), HistoryLimits::default())
    }

    pub fn with_settings(policy: ParentPolicy, limits: HistoryLimits) -> Self {
        Self {
            frames: HashMap::new(),
            policy,
            limits,
        }
    }

    pub fn policy(&self) -> ParentPolicy {
        self.policy
    }

    fn ensure_frame(&mut self, frame_id: &str) {
        if !self.frames.contains_key(frame_id) {
            log::info!("new frame '{}'", frame_id);
            self.frames.insert(frame_id.to_string(), FrameEntry::default());
        }
    }

    /// True if `ancestor` is reachable by following parents from `frame` (or equal to it).
    fn is_ancestor_or_self(&self, ancestor: &str, frame: &str) -> bool {
        let mut current = Some(frame);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.frames.len() {
                return false;
            }
            current = self.frames.get(id).and_then(|f| f.parent.as_deref());
        }
        false
    }

    pub fn add_transform(
        &mut self,
        child: &str,
        parent: &str,
        stamp: Time,
        pose: Pose,
    ) -> TransformResult<()> {
        if child == parent {
            return Err(TransformError::SelfParent(child.to_string()));
        }
        if !pose.is_finite() {
            return Err(TransformError::NonFinite {
                child: child.to_string(),
                stamp,
            });
        }

        let existing = self.frames.get(child).and_then(|f| f.parent.clone());
        if existing.as_deref() != Some(parent) && self.is_ancestor_or_self(child, parent) {
            return Err(TransformError::CyclicTransformTree {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        if let Some(existing) = existing.as_deref().filter(|p| *p != parent) {
            match self.policy {
                ParentPolicy::Reject => {
                    log::warn!(
                        "frame '{}' already has parent '{}', ignoring sample with parent '{}'",
                        child,
                        existing,
                        parent
                    );
                    return Err(TransformError::ParentConflict {
                        child: child.to_string(),
                        existing: existing.to_string(),
                        requested: parent.to_string(),
                    });
                }
                ParentPolicy::Reparent => {
                    log::warn!(
                        "re-parenting frame '{}' from '{}' to '{}'",
                        child,
                        existing,
                        parent
                    );
                }
            }
        }

        self.ensure_frame(parent);
        self.ensure_frame(child);

        let limits = self.limits;
        if let Some(entry) = self.frames.get_mut(child) {
            if entry.parent.as_deref() != Some(parent) {
                entry.history.clear();
                entry.parent = Some(parent.to_string());
            }
            entry.history.insert(stamp, pose, &limits);
        }
        Ok(())
    }

    pub fn frame_exists(&self, frame_id: &str) -> bool {
        self.frames.contains_key(frame_id)
    }

    /// True if `frame_id` has a parent and at least one sample on that edge.
    pub fn has_transform(&self, frame_id: &str) -> bool {
        self.frames
            .get(frame_id)
            .map(|f| f.parent.is_some() && !f.history.is_empty())
            .unwrap_or(false)
    }

    pub fn parent_of(&self, frame_id: &str) -> Option<&str> {
        self.frames.get(frame_id).and_then(|f| f.parent.as_deref())
    }

    pub fn history(&self, frame_id: &str) -> Option<&TransformHistory> {
        self.frames.get(frame_id).map(|f| &f.history)
    }

    pub fn frames(&self) -> impl Iterator<Item = &str> {
        self.frames.keys().map(String::as_str)
    }

    /// Frames without a parent, sorted by name.
    pub fn root_frames(&self) -> Vec<&str> {
        let mut roots: Vec<&str> = self
            .frames
            .iter()
            .filter(|(_, f)| f.parent.is_none())
            .map(|(id, _)| id.as_str())
            .collect();
        roots.sort_unstable();
        roots
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// `frame_id` followed by its ancestors up to the root.
    fn chain<'a>(&'a self, frame_id: &'a str) -> TransformResult<Vec<&'a str>> {
        if !self.frames.contains_key(frame_id) {
            return Err(TransformError::FrameNotFound(frame_id.to_string()));
        }
        let mut chain = vec![frame_id];
        let mut current = frame_id;
        while let Some(parent) = self.frames.get(current).and_then(|f| f.parent.as_deref()) {
            if chain.len() > self.frames.len() {
                return Err(TransformError::CyclicTransformTree {
                    parent: parent.to_string(),
                    child: current.to_string(),
                });
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }

    /// Composes `ancestor_T_frame` by walking `chain` (frame first) until `ancestor`.
    fn compose_up(&self, chain: &[&str], ancestor: &str, time: Time) -> TransformResult<Resolved> {
        let mut pose = Pose::IDENTITY;
        let mut quality = LookupQuality::Exact;
        for window in chain.windows(2) {
            let (child, parent) = (window[0], window[1]);
            if child == ancestor {
                break;
            }
            let sampled = self
                .frames
                .get(child)
                .and_then(|f| f.history.sample(time))
                .ok_or_else(|| TransformError::EmptyHistory {
                    parent: parent.to_string(),
                    child: child.to_string(),
                })?;
            pose = sampled.pose * pose;
            quality = quality.max(sampled.quality);
            if parent == ancestor {
                break;
            }
        }
        Ok(Resolved { pose, quality })
    }

    pub fn can_transform(&self, src: &str, dst: &str) -> bool {
        match (self.chain(src), self.chain(dst)) {
            (Ok(a), Ok(b)) => a.last() == b.last(),
            _ => false,
        }
    }

    /// Pose of `src` expressed in `dst` at `time` (`dst_T_src`).
    pub fn lookup(&self, src: &str, dst: &str, time: Time) -> TransformResult<Resolved> {
        if src == dst {
            return Ok(Resolved {
                pose: Pose::IDENTITY,
                quality: LookupQuality::Exact,
            });
        }

        let src_chain = self.chain(src)?;
        let dst_chain = self.chain(dst)?;

        let src_set: HashSet<&str> = src_chain.iter().copied().collect();
        let common = dst_chain
            .iter()
            .copied()
            .find(|f| src_set.contains(f))
            .ok_or_else(|| TransformError::NoCommonAncestor {
                from: src.to_string(),
                to: dst.to_string(),
            })?;

        let up = self.compose_up(&src_chain, common, time)?;
        let down = self.compose_up(&dst_chain, common, time)?;

        Ok(Resolved {
            pose: down.pose.inverse() * up.pose,
            quality: up.quality.max(down.quality),
        })
    }

    /// Re-expresses `pose` (given in `src`) in `dst` at `time`. On error `pose` is untouched.
    pub fn apply(
        &self,
        pose: &mut Pose,
        src: &str,
        dst: &str,
        time: Time,
    ) -> TransformResult<LookupQuality> {
        let resolved = self.lookup(src, dst, time)?;
        *pose = resolved.pose * *pose;
        Ok(resolved.quality)
    }
}
