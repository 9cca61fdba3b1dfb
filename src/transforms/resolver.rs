use super::history::LookupQuality;
use super::pose::Pose;
use super::tree::TransformTree;
use crate::error::TransformError;
use crate::time::Time;

/// Frames and display time a tick places renderables against.
#[derive(Clone, Copy, Debug)]
pub struct ResolveContext<'a> {
    pub fixed_frame: &'a str,
    pub render_frame: &'a str,
    pub current_time: Time,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PoseUpdate {
    Resolved,
    /// Resolved, but at least one edge was clamped to its nearest sample.
    Stale,
    Missing(TransformError),
}

impl PoseUpdate {
    pub fn is_placed(&self) -> bool {
        !matches!(self, PoseUpdate::Missing(_))
    }
}

/// Places `local` (expressed in `src_frame` at `src_time`) into the render frame.
///
/// The source frame is resolved against the fixed frame at the source timestamp, the
/// fixed frame against the render frame at the current display time. `out` is only
/// written when both lookups succeed.
pub fn update_pose(
    tree: &TransformTree,
    ctx: &ResolveContext<'_>,
    src_frame: &str,
    src_time: Time,
    local: &Pose,
    out: &mut Pose,
) -> PoseUpdate {
    let fixed_from_src = match tree.lookup(src_frame, ctx.fixed_frame, src_time) {
        Ok(resolved) => resolved,
        Err(err) => return PoseUpdate::Missing(err),
    };
    let render_from_fixed = match tree.lookup(ctx.fixed_frame, ctx.render_frame, ctx.current_time) {
        Ok(resolved) => resolved,
        Err(err) => return PoseUpdate::Missing(err),
    };

    *out = render_from_fixed.pose * fixed_from_src.pose * *local;

    if fixed_from_src.quality.max(render_from_fixed.quality) == LookupQuality::Clamped {
        PoseUpdate::Stale
    } else {
        PoseUpdate::Resolved
    }
}
