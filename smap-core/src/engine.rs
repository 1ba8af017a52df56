//! What the manager needs from a map engine and its clustering plugin.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{ControlPosition, MapOptions, ResolvedMapOptions, TileLayerConfig};
use crate::latlng::{LatLng, LatLngBounds, ShapeGeometry};
use crate::overlay::{IconOptions, SourceLink};
use crate::popup::PopupContent;

/// Handle to an engine-owned layer (group, marker, shape, cluster, tile).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LayerId(pub u32);

/// Handle to a pending debounce timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

/// Handle to the installed icon factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IconFactoryId(pub u32);

/// Engine events an overlay reacts to on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverlayEvent {
    Click,
    MouseOver,
    MouseOut,
    PopupOpen,
    PopupClose,
}

impl OverlayEvent {
    pub const ALL: [OverlayEvent; 5] = [
        OverlayEvent::Click,
        OverlayEvent::MouseOver,
        OverlayEvent::MouseOut,
        OverlayEvent::PopupOpen,
        OverlayEvent::PopupClose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayEvent::Click => "click",
            OverlayEvent::MouseOver => "mouseover",
            OverlayEvent::MouseOut => "mouseout",
            OverlayEvent::PopupOpen => "popupopen",
            OverlayEvent::PopupClose => "popupclose",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

/// Where a CSS class toggle lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassTarget<'a> {
    /// The rendered element of an overlay (icon or path).
    Layer(LayerId),
    /// Every element matching the selector of an external source element.
    Source(&'a str),
}

/// What the engine does once a cluster has revealed a member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealFollowUp {
    Nothing,
    OpenPopup,
}

/// Caller callback attached verbatim to an engine layer. The engine passes
/// its own native event object as the payload.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&dyn Any)>);

impl Listener {
    pub fn new(f: impl Fn(&dyn Any) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, payload: &dyn Any) {
        (self.0)(payload)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Listener(..)")
    }
}

/// Marker-clustering plugin.
pub trait ClusterBackend {
    /// Whether the clustering plugin is loaded at all.
    fn has_cluster_library(&self) -> bool;
    fn create_cluster(&mut self, options: &Map<String, Value>) -> LayerId;
    fn cluster_add_layers(&mut self, cluster: LayerId, layers: &[LayerId]);
    fn cluster_remove_layers(&mut self, cluster: LayerId, layers: &[LayerId]);
    /// Aggregate bounds of every registered member.
    fn cluster_bounds(&self, cluster: LayerId) -> LatLngBounds;
    /// Zoom/spiderfy until `layer` is individually visible, then run `then`.
    fn zoom_to_show_layer(&mut self, cluster: LayerId, layer: LayerId, then: RevealFollowUp);
}

/// Rendering engine. All calls are synchronous and made on the UI thread.
pub trait MapEngine: ClusterBackend {
    /// Whether the rendering library is loaded at all.
    fn is_available(&self) -> bool;

    // viewport
    fn create_map(&mut self, container_id: &str, options: &ResolvedMapOptions);
    fn add_tile_layer(&mut self, tile: &TileLayerConfig);
    fn set_view(&mut self, center: LatLng, zoom: f64);
    /// Re-center keeping the current zoom.
    fn set_center(&mut self, center: LatLng);
    fn set_zoom(&mut self, zoom: f64);
    fn set_zoom_control_position(&mut self, position: ControlPosition);
    fn apply_map_options(&mut self, patch: &MapOptions);
    fn fit_bounds(&mut self, bounds: &LatLngBounds, padding: [f64; 2]);
    fn invalidate_size(&mut self);
    /// Install the icon factory that copies `data` entries onto the icon
    /// element as `data-*` attributes.
    fn install_icon_factory(&mut self) -> IconFactoryId;

    // layers
    fn create_feature_group(&mut self) -> LayerId;
    fn add_to_map(&mut self, layer: LayerId);
    fn remove_from_map(&mut self, layer: LayerId);
    fn add_to_group(&mut self, group: LayerId, layer: LayerId);
    fn remove_from_group(&mut self, group: LayerId, layer: LayerId);
    /// Bounds of a layer; invalid for empty groups.
    fn layer_bounds(&self, layer: LayerId) -> LatLngBounds;
    fn create_marker(&mut self, position: LatLng, icon: Option<(&IconOptions, IconFactoryId)>) -> LayerId;
    fn create_shape(&mut self, geometry: &ShapeGeometry, style: &Map<String, Value>) -> LayerId;
    /// Forget a layer that is no longer attached anywhere.
    fn release(&mut self, layer: LayerId);

    // presentation
    fn bind_popup(&mut self, layer: LayerId, content: &PopupContent);
    fn open_popup(&mut self, layer: LayerId);
    fn close_popup(&mut self, layer: LayerId);
    /// `class` may hold several space separated names.
    fn set_class(&mut self, target: ClassTarget<'_>, class: &str, enabled: bool);

    // events
    /// Route the given engine events of `layer` back to the manager.
    fn subscribe(&mut self, layer: LayerId, events: &[OverlayEvent]);
    fn attach_listener(&mut self, layer: LayerId, event: &str, listener: &Listener);
    /// Start routing trigger events from the source element of `layer`.
    fn watch_source(&mut self, layer: LayerId, link: &SourceLink);
    fn unwatch_source(&mut self, layer: LayerId, link: &SourceLink);
    /// Fire the delayed reveal of `layer` after `delay` unless cancelled.
    fn schedule_reveal(&mut self, layer: LayerId, delay: Duration) -> TimerId;
    fn cancel_timer(&mut self, timer: TimerId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn overlay_event_names_round_trip() {
        for e in OverlayEvent::ALL {
            assert_eq!(OverlayEvent::parse(e.as_str()), Some(e));
        }
        assert_eq!(OverlayEvent::parse("dblclick"), None);
    }

    #[test]
    fn listener_receives_native_payload() {
        let seen = Rc::new(Cell::new(0u32));
        let s = seen.clone();
        let l = Listener::new(move |payload| {
            if let Some(n) = payload.downcast_ref::<u32>() {
                s.set(*n);
            }
        });
        l.clone().call(&7u32);
        assert_eq!(seen.get(), 7);
    }
}
