//! Cloud transition planner.
//!
//! Turns the previous pass's poses and the new placements into per-term
//! transitions, so a renderer can move persisting terms, grow new ones in
//! and shrink dropped ones out. Resting positions always come from the
//! layout pass; transitions only describe how to get there.
//! - Enter: new term, starts invisible at the canvas centre
//! - Move: persisting term, starts at its previous pose
//! - Exit: term no longer placed, shrinks toward the centre

use super::layout::{PlacedTerm, Pose, PreviousPlacements};

pub const ENTER_DURATION_MS: f32 = 1500.0;
/// Per-index delay between entering terms
pub const ENTER_STAGGER_MS: f32 = 50.0;
pub const MOVE_DURATION_MS: f32 = 1000.0;
pub const EXIT_DURATION_MS: f32 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Enter,
    Move,
    Exit,
}

/// Renderable state of a term at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    pub rotation_degrees: f32,
    pub scale: f32,
    pub opacity: f32,
}

impl Frame {
    fn at_pose(pose: Pose, scale: f32, opacity: f32) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            rotation_degrees: pose.rotation.degrees() as f32,
            scale,
            opacity,
        }
    }

    fn lerp(&self, to: &Frame, t: f32) -> Frame {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        Frame {
            x: mix(self.x, to.x),
            y: mix(self.y, to.y),
            rotation_degrees: mix(self.rotation_degrees, to.rotation_degrees),
            scale: mix(self.scale, to.scale),
            opacity: mix(self.opacity, to.opacity),
        }
    }
}

const ORIGIN: Frame = Frame {
    x: 0.0,
    y: 0.0,
    rotation_degrees: 0.0,
    scale: 1.0,
    opacity: 0.0,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub term: String,
    pub kind: TransitionKind,
    pub from: Frame,
    pub to: Frame,
    pub delay_ms: f32,
    pub duration_ms: f32,
}

impl Transition {
    /// Frame at `elapsed_ms` since the transition batch started.
    pub fn frame_at(&self, elapsed_ms: f32) -> Frame {
        let local = elapsed_ms - self.delay_ms;
        if local <= 0.0 {
            return self.from;
        }
        if self.duration_ms <= 0.0 || local >= self.duration_ms {
            return self.to;
        }
        self.from.lerp(&self.to, ease_cubic_out(local / self.duration_ms))
    }

    pub fn is_finished(&self, elapsed_ms: f32) -> bool {
        elapsed_ms >= self.delay_ms + self.duration_ms
    }
}

/// Plan the transitions from `previous` to `placed`.
pub fn plan_transitions(previous: &PreviousPlacements, placed: &[PlacedTerm]) -> Vec<Transition> {
    let mut transitions = Vec::with_capacity(placed.len() + previous.len());

    for (i, p) in placed.iter().enumerate() {
        let to = Frame::at_pose(p.pose(), 1.0, 1.0);
        let start = p.transition_from.or_else(|| previous.get(&p.term).copied());
        transitions.push(match start {
            Some(pose) => Transition {
                term: p.term.clone(),
                kind: TransitionKind::Move,
                from: Frame::at_pose(pose, 1.0, 1.0),
                to,
                delay_ms: 0.0,
                duration_ms: MOVE_DURATION_MS,
            },
            None => Transition {
                term: p.term.clone(),
                kind: TransitionKind::Enter,
                from: ORIGIN,
                to,
                delay_ms: i as f32 * ENTER_STAGGER_MS,
                duration_ms: ENTER_DURATION_MS,
            },
        });
    }

    // Sorted so exit order does not depend on map iteration order.
    let mut exiting: Vec<(&String, &Pose)> = previous
        .iter()
        .filter(|(term, _)| !placed.iter().any(|p| &p.term == *term))
        .collect();
    exiting.sort_by(|a, b| a.0.cmp(b.0));

    for (term, pose) in exiting {
        transitions.push(Transition {
            term: term.clone(),
            kind: TransitionKind::Exit,
            from: Frame::at_pose(*pose, 1.0, 1.0),
            to: Frame {
                scale: 0.0,
                ..ORIGIN
            },
            delay_ms: 0.0,
            duration_ms: EXIT_DURATION_MS,
        });
    }

    transitions
}

/// Resting poses of a layout, to hand to the next pass.
pub fn resting_poses(placed: &[PlacedTerm]) -> PreviousPlacements {
    placed.iter().map(|p| (p.term.clone(), p.pose())).collect()
}

#[inline]
fn ease_cubic_out(t: f32) -> f32 {
    let u = 1.0 - t;
    1.0 - u * u * u
}
