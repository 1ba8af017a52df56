use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::{ControlPosition, MapOptions, ResolvedMapOptions, TileLayerConfig};
use crate::engine::{
    ClassTarget, ClusterBackend, IconFactoryId, LayerId, Listener, MapEngine, OverlayEvent,
    RevealFollowUp, TimerId,
};
use crate::latlng::{LatLng, LatLngBounds, ShapeGeometry};
use crate::overlay::{IconOptions, SourceLink};
use crate::popup::PopupContent;

/// One mutating engine call.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    CreateMap { container: String, center: LatLng },
    AddTileLayer { url: String },
    SetView { center: LatLng, zoom: f64 },
    SetCenter(LatLng),
    SetZoom(f64),
    SetZoomPosition(ControlPosition),
    ApplyMapOptions(MapOptions),
    FitBounds { bounds: LatLngBounds, padding: [f64; 2] },
    InvalidateSize,
    InstallIconFactory,
    CreateFeatureGroup(LayerId),
    CreateMarker(LayerId),
    CreateShape(LayerId),
    CreateCluster(LayerId),
    AddToMap(LayerId),
    RemoveFromMap(LayerId),
    AddToGroup { group: LayerId, layer: LayerId },
    RemoveFromGroup { group: LayerId, layer: LayerId },
    Release(LayerId),
    ClusterAddLayers(Vec<LayerId>),
    ClusterRemoveLayers(Vec<LayerId>),
    ZoomToShowLayer { cluster: LayerId, layer: LayerId, then: RevealFollowUp },
    BindPopup(LayerId),
    OpenPopup(LayerId),
    ClosePopup(LayerId),
    SetClass { target: String, class: String, enabled: bool },
    Subscribe(LayerId),
    AttachListener { layer: LayerId, event: String },
    WatchSource { layer: LayerId, container: String },
    UnwatchSource { layer: LayerId, container: String },
    ScheduleReveal { layer: LayerId, timer: TimerId },
    CancelTimer(TimerId),
}

#[derive(Clone, Debug)]
pub enum LayerKind {
    FeatureGroup { children: Vec<LayerId> },
    Cluster { members: BTreeSet<LayerId> },
    Marker { position: LatLng },
    Shape { bounds: LatLngBounds, style: Map<String, Value> },
}

#[derive(Clone, Debug)]
pub struct HeadlessLayer {
    pub kind: LayerKind,
    pub on_map: bool,
    pub icon: Option<IconOptions>,
    pub classes: BTreeSet<String>,
    pub popup: Option<PopupContent>,
    pub popup_open: bool,
    pub subscribed: Vec<OverlayEvent>,
    pub listeners: Vec<(String, Listener)>,
    pub source: Option<SourceLink>,
}

impl HeadlessLayer {
    fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            on_map: false,
            icon: None,
            classes: BTreeSet::new(),
            popup: None,
            popup_open: false,
            subscribed: Vec::new(),
            listeners: Vec::new(),
            source: None,
        }
    }
}

#[derive(Debug)]
pub struct HeadlessEngine {
    available: bool,
    cluster_library: bool,
    next_id: u32,
    next_timer: u32,
    layers: HashMap<LayerId, HeadlessLayer>,
    source_classes: HashMap<String, BTreeSet<String>>,
    timers: BTreeMap<TimerId, (LayerId, Duration)>,
    calls: Vec<EngineCall>,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn split_classes(class: &str) -> impl Iterator<Item = &str> {
    class.split_whitespace()
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            available: true,
            cluster_library: true,
            next_id: 1,
            next_timer: 1,
            layers: HashMap::new(),
            source_classes: HashMap::new(),
            timers: BTreeMap::new(),
            calls: Vec::new(),
        }
    }

    /// Behave as if the rendering library were not loaded.
    pub fn without_engine(mut self) -> Self {
        self.available = false;
        self
    }

    /// Behave as if the clustering plugin were not loaded.
    pub fn without_cluster_library(mut self) -> Self {
        self.cluster_library = false;
        self
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<EngineCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn count_calls(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn layer(&self, id: LayerId) -> Option<&HeadlessLayer> {
        self.layers.get(&id)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn has_class(&self, id: LayerId, class: &str) -> bool {
        self.layers.get(&id).is_some_and(|l| l.classes.contains(class))
    }

    pub fn source_has_class(&self, container: &str, class: &str) -> bool {
        self.source_classes
            .get(container)
            .is_some_and(|c| c.contains(class))
    }

    pub fn is_popup_open(&self, id: LayerId) -> bool {
        self.layers.get(&id).is_some_and(|l| l.popup_open)
    }

    pub fn group_children(&self, group: LayerId) -> Vec<LayerId> {
        match self.layers.get(&group).map(|l| &l.kind) {
            Some(LayerKind::FeatureGroup { children }) => children.clone(),
            _ => Vec::new(),
        }
    }

    pub fn cluster_members(&self, cluster: LayerId) -> Vec<LayerId> {
        match self.layers.get(&cluster).map(|l| &l.kind) {
            Some(LayerKind::Cluster { members }) => members.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn watched_source(&self, id: LayerId) -> Option<&SourceLink> {
        self.layers.get(&id).and_then(|l| l.source.as_ref())
    }

    pub fn pending_timers(&self) -> &BTreeMap<TimerId, (LayerId, Duration)> {
        &self.timers
    }

    /// Pop a pending timer as if it had fired. The caller hands it on to
    /// [`crate::MapManager::run_scheduled_reveal`].
    pub fn fire_timer(&mut self, timer: TimerId) -> Option<LayerId> {
        self.timers.remove(&timer).map(|(layer, _)| layer)
    }

    /// Invoke the caller listeners attached to `layer` for `event`.
    pub fn emit(&self, layer: LayerId, event: &str, payload: &dyn Any) {
        if let Some(l) = self.layers.get(&layer) {
            for (name, listener) in &l.listeners {
                if name == event {
                    listener.call(payload);
                }
            }
        }
    }

    fn alloc(&mut self, kind: LayerKind) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.layers.insert(id, HeadlessLayer::new(kind));
        id
    }

    fn bounds_of(&self, id: LayerId) -> LatLngBounds {
        match self.layers.get(&id).map(|l| &l.kind) {
            Some(LayerKind::Marker { position }) => LatLngBounds::from_point(*position),
            Some(LayerKind::Shape { bounds, .. }) => *bounds,
            Some(LayerKind::FeatureGroup { children }) => {
                children.iter().map(|c| self.bounds_of(*c)).collect()
            }
            Some(LayerKind::Cluster { members }) => {
                members.iter().map(|c| self.bounds_of(*c)).collect()
            }
            None => LatLngBounds::empty(),
        }
    }
}

impl ClusterBackend for HeadlessEngine {
    fn has_cluster_library(&self) -> bool {
        self.cluster_library
    }

    fn create_cluster(&mut self, _options: &Map<String, Value>) -> LayerId {
        let id = self.alloc(LayerKind::Cluster {
            members: BTreeSet::new(),
        });
        self.calls.push(EngineCall::CreateCluster(id));
        id
    }

    fn cluster_add_layers(&mut self, cluster: LayerId, layers: &[LayerId]) {
        if let Some(LayerKind::Cluster { members }) = self.layers.get_mut(&cluster).map(|l| &mut l.kind) {
            members.extend(layers.iter().copied());
        }
        for l in layers {
            if let Some(layer) = self.layers.get_mut(l) {
                layer.on_map = true;
            }
        }
        self.calls.push(EngineCall::ClusterAddLayers(layers.to_vec()));
    }

    fn cluster_remove_layers(&mut self, cluster: LayerId, layers: &[LayerId]) {
        if let Some(LayerKind::Cluster { members }) = self.layers.get_mut(&cluster).map(|l| &mut l.kind) {
            for l in layers {
                members.remove(l);
            }
        }
        for l in layers {
            if let Some(layer) = self.layers.get_mut(l) {
                layer.on_map = false;
            }
        }
        self.calls.push(EngineCall::ClusterRemoveLayers(layers.to_vec()));
    }

    fn cluster_bounds(&self, cluster: LayerId) -> LatLngBounds {
        self.bounds_of(cluster)
    }

    fn zoom_to_show_layer(&mut self, cluster: LayerId, layer: LayerId, then: RevealFollowUp) {
        self.calls.push(EngineCall::ZoomToShowLayer { cluster, layer, then });
        if then == RevealFollowUp::OpenPopup
            && let Some(l) = self.layers.get_mut(&layer)
            && l.popup.is_some()
        {
            l.popup_open = true;
        }
    }
}

impl MapEngine for HeadlessEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    fn create_map(&mut self, container_id: &str, options: &ResolvedMapOptions) {
        self.calls.push(EngineCall::CreateMap {
            container: container_id.to_string(),
            center: options.center,
        });
    }

    fn add_tile_layer(&mut self, tile: &TileLayerConfig) {
        self.calls.push(EngineCall::AddTileLayer {
            url: tile.url.clone(),
        });
    }

    fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.calls.push(EngineCall::SetView { center, zoom });
    }

    fn set_center(&mut self, center: LatLng) {
        self.calls.push(EngineCall::SetCenter(center));
    }

    fn set_zoom(&mut self, zoom: f64) {
        self.calls.push(EngineCall::SetZoom(zoom));
    }

    fn set_zoom_control_position(&mut self, position: ControlPosition) {
        self.calls.push(EngineCall::SetZoomPosition(position));
    }

    fn apply_map_options(&mut self, patch: &MapOptions) {
        self.calls.push(EngineCall::ApplyMapOptions(patch.clone()));
    }

    fn fit_bounds(&mut self, bounds: &LatLngBounds, padding: [f64; 2]) {
        self.calls.push(EngineCall::FitBounds {
            bounds: *bounds,
            padding,
        });
    }

    fn invalidate_size(&mut self) {
        self.calls.push(EngineCall::InvalidateSize);
    }

    fn install_icon_factory(&mut self) -> IconFactoryId {
        self.calls.push(EngineCall::InstallIconFactory);
        IconFactoryId(1)
    }

    fn create_feature_group(&mut self) -> LayerId {
        let id = self.alloc(LayerKind::FeatureGroup {
            children: Vec::new(),
        });
        self.calls.push(EngineCall::CreateFeatureGroup(id));
        id
    }

    fn add_to_map(&mut self, layer: LayerId) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.on_map = true;
        }
        self.calls.push(EngineCall::AddToMap(layer));
    }

    fn remove_from_map(&mut self, layer: LayerId) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.on_map = false;
        }
        self.calls.push(EngineCall::RemoveFromMap(layer));
    }

    fn add_to_group(&mut self, group: LayerId, layer: LayerId) {
        if let Some(LayerKind::FeatureGroup { children }) = self.layers.get_mut(&group).map(|l| &mut l.kind)
            && !children.contains(&layer)
        {
            children.push(layer);
        }
        if let Some(l) = self.layers.get_mut(&layer) {
            l.on_map = true;
        }
        self.calls.push(EngineCall::AddToGroup { group, layer });
    }

    fn remove_from_group(&mut self, group: LayerId, layer: LayerId) {
        if let Some(LayerKind::FeatureGroup { children }) = self.layers.get_mut(&group).map(|l| &mut l.kind) {
            children.retain(|c| *c != layer);
        }
        if let Some(l) = self.layers.get_mut(&layer) {
            l.on_map = false;
        }
        self.calls.push(EngineCall::RemoveFromGroup { group, layer });
    }

    fn layer_bounds(&self, layer: LayerId) -> LatLngBounds {
        self.bounds_of(layer)
    }

    fn create_marker(&mut self, position: LatLng, icon: Option<(&IconOptions, IconFactoryId)>) -> LayerId {
        let id = self.alloc(LayerKind::Marker { position });
        if let Some((icon, _)) = icon
            && let Some(l) = self.layers.get_mut(&id)
        {
            l.icon = Some(icon.clone());
        }
        self.calls.push(EngineCall::CreateMarker(id));
        id
    }

    fn create_shape(&mut self, geometry: &ShapeGeometry, style: &Map<String, Value>) -> LayerId {
        let bounds = geometry.bounds().unwrap_or_default();
        let id = self.alloc(LayerKind::Shape {
            bounds,
            style: style.clone(),
        });
        self.calls.push(EngineCall::CreateShape(id));
        id
    }

    fn release(&mut self, layer: LayerId) {
        self.layers.remove(&layer);
        self.timers.retain(|_, (l, _)| *l != layer);
        self.calls.push(EngineCall::Release(layer));
    }

    fn bind_popup(&mut self, layer: LayerId, content: &PopupContent) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.popup = Some(content.clone());
        }
        self.calls.push(EngineCall::BindPopup(layer));
    }

    fn open_popup(&mut self, layer: LayerId) {
        if let Some(l) = self.layers.get_mut(&layer)
            && l.popup.is_some()
        {
            l.popup_open = true;
        }
        self.calls.push(EngineCall::OpenPopup(layer));
    }

    fn close_popup(&mut self, layer: LayerId) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.popup_open = false;
        }
        self.calls.push(EngineCall::ClosePopup(layer));
    }

    fn set_class(&mut self, target: ClassTarget<'_>, class: &str, enabled: bool) {
        let set = match target {
            ClassTarget::Layer(id) => self.layers.get_mut(&id).map(|l| &mut l.classes),
            ClassTarget::Source(sel) => Some(self.source_classes.entry(sel.to_string()).or_default()),
        };
        if let Some(set) = set {
            for c in split_classes(class) {
                if enabled {
                    set.insert(c.to_string());
                } else {
                    set.remove(c);
                }
            }
        }
        let target = match target {
            ClassTarget::Layer(id) => format!("layer:{}", id.0),
            ClassTarget::Source(sel) => sel.to_string(),
        };
        self.calls.push(EngineCall::SetClass {
            target,
            class: class.to_string(),
            enabled,
        });
    }

    fn subscribe(&mut self, layer: LayerId, events: &[OverlayEvent]) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.subscribed.extend_from_slice(events);
        }
        self.calls.push(EngineCall::Subscribe(layer));
    }

    fn attach_listener(&mut self, layer: LayerId, event: &str, listener: &Listener) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.listeners.push((event.to_string(), listener.clone()));
        }
        self.calls.push(EngineCall::AttachListener {
            layer,
            event: event.to_string(),
        });
    }

    fn watch_source(&mut self, layer: LayerId, link: &SourceLink) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.source = Some(link.clone());
        }
        self.calls.push(EngineCall::WatchSource {
            layer,
            container: link.container.clone(),
        });
    }

    fn unwatch_source(&mut self, layer: LayerId, link: &SourceLink) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.source = None;
        }
        self.calls.push(EngineCall::UnwatchSource {
            layer,
            container: link.container.clone(),
        });
    }

    fn schedule_reveal(&mut self, layer: LayerId, delay: Duration) -> TimerId {
        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.timers.insert(timer, (layer, delay));
        self.calls.push(EngineCall::ScheduleReveal { layer, timer });
        timer
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
        self.calls.push(EngineCall::CancelTimer(timer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_reports_invalid_bounds() {
        let mut engine = HeadlessEngine::new();
        let g = engine.create_feature_group();
        assert!(!engine.layer_bounds(g).is_valid());

        let m = engine.create_marker(LatLng::new(1.0, 2.0), None);
        engine.add_to_group(g, m);
        assert_eq!(engine.layer_bounds(g), LatLngBounds::from_point(LatLng::new(1.0, 2.0)));
    }

    #[test]
    fn multi_class_strings_toggle_each_name() {
        let mut engine = HeadlessEngine::new();
        let m = engine.create_marker(LatLng::new(1.0, 2.0), None);
        engine.set_class(ClassTarget::Layer(m), "a b", true);
        assert!(engine.has_class(m, "a") && engine.has_class(m, "b"));
        engine.set_class(ClassTarget::Layer(m), "a", false);
        assert!(!engine.has_class(m, "a") && engine.has_class(m, "b"));
    }

    #[test]
    fn released_layers_drop_their_timers() {
        let mut engine = HeadlessEngine::new();
        let m = engine.create_marker(LatLng::new(1.0, 2.0), None);
        let t = engine.schedule_reveal(m, Duration::from_millis(600));
        engine.release(m);
        assert!(engine.fire_timer(t).is_none());
        assert!(engine.layer(m).is_none());
    }
}
