use crate::entity::ObjectRef;

/// Notifications for the UI layer, drained with `take_events`.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    ObjectHighlighted {
        graph: String,
        object: Option<ObjectRef>,
    },
    /// A drill-down was requested; the path is `[]` for global, `[region]`
    /// or `[region, service]`.
    SetView { path: Vec<String> },
    ViewUpdated { graph: String },
    LayoutApplied { graph: String, generation: u64 },
}
