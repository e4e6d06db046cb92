use serde::{Deserialize, Serialize};

pub const NO_METRICS_NOTICE: &str = "Connection found, but no metrics.";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    #[serde(default)]
    pub severity: u8,
    #[serde(default)]
    pub link: Option<String>,
}

impl Notice {
    pub fn new(title: impl Into<String>, severity: u8) -> Self {
        Self {
            title: title.into(),
            severity,
            link: None,
        }
    }
}

pub(crate) fn meets_threshold(notices: &[Notice], threshold: Option<u8>) -> bool {
    match threshold {
        None => !notices.is_empty(),
        Some(minimum) => notices.iter().any(|notice| notice.severity >= minimum),
    }
}

pub(crate) fn highest_level(notices: &[Notice]) -> Option<u8> {
    notices.iter().map(|notice| notice.severity).max()
}
