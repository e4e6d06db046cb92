//! The contract between the engine and whatever draws it.

use std::cell::RefCell;
use std::rc::Rc;

use eframe::egui::Vec2;

use crate::entity::ObjectRef;
use crate::layout::geometry::{arc_control_point, circle_center};

/// Callbacks the engine makes into the rendering layer. Every method is
/// required, so a renderer cannot silently skip one.
pub trait ViewBridge {
    fn visibility_changed(&mut self, object: &ObjectRef, visible: bool);
    fn object_updated(&mut self, object: &ObjectRef);
    fn object_removed(&mut self, object: &ObjectRef);
    fn position_changed(&mut self, node: &str, position: Vec2);
    /// Hit-testing structures are stale (objects moved, appeared or left).
    fn invalidate_interactive_children(&mut self);
}

#[derive(Clone, Debug, PartialEq)]
pub enum ViewCall {
    Visibility(ObjectRef, bool),
    Updated(ObjectRef),
    Removed(ObjectRef),
    Position(String, Vec2),
    InvalidateInteractive,
}

/// Bridge that records every call. Used headless and in tests; clones share
/// the same log.
#[derive(Clone, Default)]
pub struct RecordingView {
    calls: Rc<RefCell<Vec<ViewCall>>>,
}

impl RecordingView {
    pub fn calls(&self) -> Vec<ViewCall> {
        self.calls.borrow().clone()
    }

    pub fn take(&self) -> Vec<ViewCall> {
        self.calls.take()
    }

    fn push(&self, call: ViewCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl ViewBridge for RecordingView {
    fn visibility_changed(&mut self, object: &ObjectRef, visible: bool) {
        self.push(ViewCall::Visibility(object.clone(), visible));
    }

    fn object_updated(&mut self, object: &ObjectRef) {
        self.push(ViewCall::Updated(object.clone()));
    }

    fn object_removed(&mut self, object: &ObjectRef) {
        self.push(ViewCall::Removed(object.clone()));
    }

    fn position_changed(&mut self, node: &str, position: Vec2) {
        self.push(ViewCall::Position(node.to_owned(), position));
    }

    fn invalidate_interactive_children(&mut self) {
        self.push(ViewCall::InvalidateInteractive);
    }
}

/// Bridge for graphs nobody is drawing.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedView;

impl ViewBridge for DetachedView {
    fn visibility_changed(&mut self, _object: &ObjectRef, _visible: bool) {}
    fn object_updated(&mut self, _object: &ObjectRef) {}
    fn object_removed(&mut self, _object: &ObjectRef) {}
    fn position_changed(&mut self, _node: &str, _position: Vec2) {}
    fn invalidate_interactive_children(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConnectionPath {
    Straight { from: Vec2, to: Vec2 },
    Arc { from: Vec2, to: Vec2, center: Vec2, radius: f32 },
}

/// Path a renderer should draw for a connection. Ring layouts bend their
/// connections; degenerate arcs fall back to a straight line.
pub fn connection_path(source: Vec2, target: Vec2, bulge: f32) -> ConnectionPath {
    if bulge == 0.0 || (target - source).length() < 1e-3 {
        return ConnectionPath::Straight {
            from: source,
            to: target,
        };
    }

    let control = arc_control_point(source, target, bulge);
    match circle_center(source, control, target) {
        Some(center) => ConnectionPath::Arc {
            from: source,
            to: target,
            center,
            radius: (source - center).length(),
        },
        None => ConnectionPath::Straight {
            from: source,
            to: target,
        },
    }
}
