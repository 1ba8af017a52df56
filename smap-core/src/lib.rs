//! Named groups of markers and GeoJSON shapes over a slippy-map engine,
//! with optional clustering, popups and camera fitting.

pub mod classes;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod group;
pub mod headless;
pub mod latlng;
pub mod manager;
pub mod overlay;
pub mod popup;

pub use classes::{ClassNames, ClassRole, ClassSpec};
pub use cluster::ClusterAdapter;
pub use config::{ControlPosition, MapConfig, MapOptions, ResolvedConfig, TileLayerConfig};
pub use engine::{
    ClassTarget, ClusterBackend, IconFactoryId, LayerId, Listener, MapEngine, OverlayEvent,
    RevealFollowUp, TimerId,
};
pub use error::{ConfigError, ContainerProblem, Result, SmapError};
pub use group::{DEFAULT_GROUP, Group, GroupKind};
pub use headless::{EngineCall, HeadlessEngine};
pub use latlng::{LatLng, LatLngBounds, ShapeGeometry};
pub use manager::{AddOptions, Container, MapManager};
pub use overlay::{
    IconOptions, IconSpec, MarkerSpec, Overlay, OverlayKind, OverlayPlacement, REVEAL_DELAY,
    ShapeSpec, SourceLink, SourceTrigger,
};
pub use popup::{Popup, PopupContent, PopupOptions};
