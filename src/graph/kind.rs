use crate::layout::LayoutKind;

/// The closed set of graph flavours the scene knows how to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphKind {
    /// Region-to-region overview.
    Global,
    /// Service-to-service inside one region.
    Region,
    /// Drill-down around a single service.
    Focused,
    /// Externally ranked resolver graph.
    Dns,
}

impl GraphKind {
    pub fn from_renderer(renderer: Option<&str>) -> Option<Self> {
        match renderer? {
            "global" => Some(Self::Global),
            "region" => Some(Self::Region),
            "focused" | "focusedChild" => Some(Self::Focused),
            "dns" => Some(Self::Dns),
            _ => None,
        }
    }

    pub fn default_layout(self) -> LayoutKind {
        match self {
            Self::Global => LayoutKind::RingCenter,
            Self::Region | Self::Focused => LayoutKind::Ranked,
            Self::Dns => LayoutKind::DnsRank,
        }
    }

    pub fn supports_physics(self) -> bool {
        matches!(self, Self::Region)
    }

    /// How far ring-style views bend their connections.
    pub fn connection_bulge(self) -> f32 {
        match self {
            Self::Global => 0.2,
            _ => 0.0,
        }
    }
}
