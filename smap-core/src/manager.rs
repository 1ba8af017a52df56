use std::collections::BTreeMap;

use serde::Deserialize;

use crate::cluster::ClusterAdapter;
use crate::config::{MapConfig, MapOptions, ResolvedConfig};
use crate::engine::{IconFactoryId, LayerId, MapEngine, OverlayEvent, TimerId};
use crate::error::{ConfigError, ContainerProblem, SmapError};
use crate::group::{Group, GroupKind};
use crate::latlng::{LatLng, LatLngBounds};
use crate::overlay::{MarkerSpec, Overlay, OverlayPlacement, ShapeSpec, SourceTrigger};

/// Element the map is mounted into. The engine addresses it by `id`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container {
    pub id: Option<String>,
}

impl Container {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }
}

/// Options of `add_markers` / `add_shapes`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AddOptions {
    /// Drop the target group before adding.
    pub replace: bool,
}

impl AddOptions {
    pub const REPLACE: AddOptions = AddOptions { replace: true };
}

pub struct MapManager<E: MapEngine> {
    engine: E,
    config: ResolvedConfig,
    groups: BTreeMap<String, Group>,
    cluster: Option<ClusterAdapter>,
    icon_factory: Option<IconFactoryId>,
}

fn reject<T>(err: ConfigError) -> Result<T, ConfigError> {
    log::error!("Smap: {err}");
    Err(err)
}

impl<E: MapEngine> MapManager<E> {
    /// Validate everything first, then create the map, the background tiles,
    /// the initial view and the icon factory. A failed validation leaves the
    /// engine untouched.
    pub fn initialize(engine: E, container: Option<&Container>, config: MapConfig) -> Result<Self, ConfigError> {
        if !engine.is_available() {
            return reject(ConfigError::MissingEngine);
        }
        let container_id = match container {
            None => return reject(ConfigError::InvalidContainer(ContainerProblem::NotFound)),
            Some(Container { id: None }) => {
                return reject(ConfigError::InvalidContainer(ContainerProblem::MissingId));
            }
            Some(Container { id: Some(id) }) if id.trim().is_empty() => {
                return reject(ConfigError::InvalidContainer(ContainerProblem::MissingId));
            }
            Some(Container { id: Some(id) }) => id.clone(),
        };
        let config = match config.resolve() {
            Ok(c) => c,
            Err(e) => return reject(e),
        };
        if config.enable_clusters && !engine.has_cluster_library() {
            return reject(ConfigError::MissingClusterLibrary);
        }

        let mut manager = Self {
            engine,
            config,
            groups: BTreeMap::new(),
            cluster: None,
            icon_factory: None,
        };
        manager.engine.create_map(&container_id, &manager.config.map);
        manager.engine.add_tile_layer(&manager.config.tile_layer);
        manager.set_view();
        manager.icon_factory = Some(manager.engine.install_icon_factory());
        log::debug!("Smap: map mounted on #{container_id}");
        Ok(manager)
    }

    fn set_view(&mut self) {
        let map = &self.config.map;
        self.engine.set_view(map.center, map.zoom);
        self.engine.set_zoom_control_position(map.zoom_position);
    }

    /// Add one marker per record to `group`.
    ///
    /// With clustering enabled the markers are handed to the cluster (created
    /// on first use); otherwise they go straight onto the group layer.
    /// Invalid records are logged and skipped. An empty batch changes nothing
    /// beyond the optional replace.
    pub fn add_markers(&mut self, records: Vec<MarkerSpec>, options: AddOptions, group: &str) -> &mut Self {
        if options.replace {
            self.remove_group(group, false);
        }
        if records.is_empty() {
            return self;
        }
        if self.config.enable_clusters && self.cluster.is_none() {
            self.cluster = Some(ClusterAdapter::create(&mut self.engine, &self.config.cluster_options));
        }

        let kind = if self.cluster.is_some() {
            GroupKind::MarkerClustered
        } else {
            GroupKind::Marker
        };
        let Self {
            engine,
            groups,
            cluster,
            icon_factory,
            ..
        } = self;
        let target = groups
            .entry(group.to_string())
            .or_insert_with(|| Group::create(group, kind, engine));
        let placement = match cluster.as_ref() {
            Some(c) => OverlayPlacement::Clustered { cluster: c.handle() },
            None => OverlayPlacement::Direct {
                group_layer: target.layer(),
            },
        };

        let start = target.len();
        for spec in records {
            match Overlay::marker(spec, placement, *icon_factory, engine) {
                Ok(overlay) => target.add_member(overlay, engine),
                Err(e) => log::error!("Smap: marker skipped in group {group:?}: {e}"),
            }
        }
        if let Some(c) = cluster.as_mut() {
            let fresh: Vec<LayerId> = target.members()[start..].iter().map(Overlay::layer).collect();
            c.add_layers(engine, &fresh);
        }
        for overlay in &target.members()[start..] {
            overlay.on_attached(engine);
        }

        self.update()
    }

    /// Add one shape per record to `group`. Shapes never join the cluster.
    pub fn add_shapes(&mut self, records: Vec<ShapeSpec>, options: AddOptions, group: &str) -> &mut Self {
        if options.replace {
            self.remove_group(group, false);
        }
        if records.is_empty() {
            return self;
        }

        let Self { engine, groups, .. } = self;
        let target = groups
            .entry(group.to_string())
            .or_insert_with(|| Group::create(group, GroupKind::Shape, engine));
        let placement = OverlayPlacement::Direct {
            group_layer: target.layer(),
        };

        let start = target.len();
        for spec in records {
            match Overlay::shape(spec, placement, engine) {
                Ok(overlay) => target.add_member(overlay, engine),
                Err(e) => log::error!("Smap: shape skipped in group {group:?}: {e}"),
            }
        }
        for overlay in &target.members()[start..] {
            overlay.on_attached(engine);
        }

        self.update()
    }

    /// Remove one group. Only that group's members leave the cluster.
    pub fn remove_group(&mut self, group: &str, trigger_update: bool) -> &mut Self {
        let Some(removed) = self.groups.remove(group) else {
            return self;
        };
        removed.destroy(&mut self.engine, self.cluster.as_mut());
        if trigger_update {
            self.update();
        }
        self
    }

    /// Remove every group and tear the cluster down; the next clustered add
    /// starts a fresh one.
    pub fn remove_groups(&mut self, trigger_update: bool) -> &mut Self {
        for (_, group) in std::mem::take(&mut self.groups) {
            group.destroy(&mut self.engine, self.cluster.as_mut());
        }
        if let Some(cluster) = self.cluster.take() {
            cluster.teardown(&mut self.engine);
            log::debug!("Smap: marker cluster removed");
        }
        if trigger_update {
            self.update();
        }
        self
    }

    /// Re-fit the camera when auto-center is on, then let the engine pick up
    /// any container resize.
    pub fn update(&mut self) -> &mut Self {
        if self.config.auto_center && !self.groups.is_empty() {
            let bounds = self.camera_bounds();
            if bounds.is_valid() {
                self.engine.fit_bounds(&bounds, self.config.bounds_padding);
            }
        }
        self.engine.invalidate_size();
        self
    }

    /// Union of every group layer's bounds plus the cluster's. Clustered
    /// markers never sit on a group layer; empty groups contribute nothing.
    pub fn camera_bounds(&self) -> LatLngBounds {
        let mut bounds: LatLngBounds = self
            .groups
            .values()
            .map(|g| self.engine.layer_bounds(g.layer()))
            .filter(LatLngBounds::is_valid)
            .collect();
        if let Some(cluster) = &self.cluster {
            bounds.extend(&cluster.bounds(&self.engine));
        }
        bounds
    }

    pub fn set_center(&mut self, center: LatLng) -> &mut Self {
        if !center.is_valid() {
            let err = SmapError::invalid_option_type("center", "an indexed array [lat, lng]");
            log::error!("Smap: {err}");
            return self;
        }
        self.config.map.center = center;
        self.engine.set_center(center);
        self.update()
    }

    pub fn set_zoom(&mut self, zoom: f64) -> &mut Self {
        if !zoom.is_finite() {
            log::error!("Smap: {}", SmapError::invalid_option_type("zoom", "a number"));
            return self;
        }
        self.config.map.zoom = zoom;
        self.engine.set_zoom(zoom);
        self.update()
    }

    /// Merge `patch` into the map options and forward it to the engine.
    pub fn set_map_options(&mut self, patch: MapOptions) -> &mut Self {
        if patch.center.is_some_and(|c| !c.is_valid()) {
            let err = SmapError::invalid_option_type("center", "an indexed array [lat, lng]");
            log::error!("Smap: {err}");
            return self;
        }
        self.config.map.apply(&patch);
        self.engine.apply_map_options(&patch);
        if patch.zoom_position.is_some() {
            self.engine.set_zoom_control_position(self.config.map.zoom_position);
        }
        self.update()
    }

    /// Route one of an overlay's own engine events to it.
    pub fn handle_layer_event(&mut self, layer: LayerId, event: OverlayEvent) -> bool {
        self.with_overlay(layer, |overlay, engine| overlay.handle_event(event, engine))
    }

    /// Route source-element activity to the linked overlay.
    pub fn handle_source_trigger(&mut self, layer: LayerId, trigger: SourceTrigger) -> bool {
        self.with_overlay(layer, |overlay, engine| overlay.handle_source_trigger(trigger, engine))
    }

    /// Called by the engine when a debounce timer fires.
    pub fn run_scheduled_reveal(&mut self, layer: LayerId, timer: TimerId) -> bool {
        self.with_overlay(layer, |overlay, engine| overlay.run_scheduled_reveal(timer, engine))
    }

    /// Bring an overlay into view (through the cluster when clustered) and
    /// open its popup.
    pub fn reveal(&mut self, layer: LayerId) -> bool {
        self.with_overlay(layer, |overlay, engine| overlay.reveal(engine))
    }

    fn with_overlay(&mut self, layer: LayerId, f: impl FnOnce(&mut Overlay, &mut E)) -> bool {
        let Self { engine, groups, .. } = self;
        match groups.values_mut().find_map(|g| g.overlay_mut(layer)) {
            Some(overlay) => {
                f(overlay, engine);
                true
            }
            None => {
                log::debug!("Smap: event for unknown layer {layer:?} ignored");
                false
            }
        }
    }

    pub fn get_group(&self, group: &str) -> Option<&Group> {
        self.groups.get(group)
    }

    pub fn groups(&self) -> &BTreeMap<String, Group> {
        &self.groups
    }

    pub fn find_overlay(&self, layer: LayerId) -> Option<&Overlay> {
        self.groups.values().find_map(|g| g.overlay(layer))
    }

    pub fn cluster(&self) -> Option<&ClusterAdapter> {
        self.cluster.as_ref()
    }

    pub fn is_clustering(&self) -> bool {
        self.cluster.is_some()
    }

    pub fn icon_factory(&self) -> Option<IconFactoryId> {
        self.icon_factory
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn center(&self) -> LatLng {
        self.config.map.center
    }

    pub fn zoom(&self) -> f64 {
        self.config.map.zoom
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{EngineCall, HeadlessEngine};
    use serde_json::json;

    fn manager(config: serde_json::Value) -> MapManager<HeadlessEngine> {
        let config: MapConfig = serde_json::from_value(config).unwrap();
        MapManager::initialize(HeadlessEngine::new(), Some(&Container::with_id("map")), config).unwrap()
    }

    #[test]
    fn initialize_sets_up_viewport_in_order() {
        let m = manager(json!({ "map": { "center": [45, 5] } }));
        let calls = m.engine().calls();
        assert!(matches!(&calls[0], EngineCall::CreateMap { container, .. } if container == "map"));
        assert!(matches!(&calls[1], EngineCall::AddTileLayer { url } if url.contains("voyager")));
        assert_eq!(calls[2], EngineCall::SetView { center: LatLng::new(45.0, 5.0), zoom: 10.0 });
        assert_eq!(calls[4], EngineCall::InstallIconFactory);
        assert!(m.icon_factory().is_some());
        assert!(m.groups().is_empty());
        assert!(!m.is_clustering());
    }

    #[test]
    fn blank_container_id_is_rejected() {
        let config: MapConfig = serde_json::from_value(json!({ "map": { "center": [1, 1] } })).unwrap();
        let err = MapManager::initialize(HeadlessEngine::new(), Some(&Container::with_id("  ")), config)
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::InvalidContainer(ContainerProblem::MissingId));
    }

    #[test]
    fn set_zoom_stores_forwards_and_updates() {
        let mut m = manager(json!({ "map": { "center": [45, 5] } }));
        m.engine_mut().take_calls();
        m.set_zoom(13.0);
        assert_eq!(m.zoom(), 13.0);
        assert_eq!(m.engine().calls(), &[EngineCall::SetZoom(13.0), EngineCall::InvalidateSize]);

        m.engine_mut().take_calls();
        m.set_zoom(f64::NAN);
        assert_eq!(m.zoom(), 13.0);
        assert!(m.engine().calls().is_empty());
    }

    #[test]
    fn invalid_center_is_ignored() {
        let mut m = manager(json!({ "map": { "center": [45, 5] } }));
        m.engine_mut().take_calls();
        m.set_center(LatLng::new(123.0, 0.0));
        assert_eq!(m.center(), LatLng::new(45.0, 5.0));
        assert!(m.engine().calls().is_empty());

        m.set_center(LatLng::new(40.0, 1.0));
        assert_eq!(m.center(), LatLng::new(40.0, 1.0));
        assert_eq!(m.engine().calls()[0], EngineCall::SetCenter(LatLng::new(40.0, 1.0)));
    }

    #[test]
    fn map_options_patch_is_merged_and_forwarded() {
        let mut m = manager(json!({ "map": { "center": [45, 5] } }));
        m.engine_mut().take_calls();
        let patch = MapOptions::from_json(json!({ "minZoom": 2, "zoomPosition": "topleft" })).unwrap();
        m.set_map_options(patch.clone());
        assert_eq!(m.config().map.min_zoom, 2.0);
        assert_eq!(
            m.engine().calls(),
            &[
                EngineCall::ApplyMapOptions(patch),
                EngineCall::SetZoomPosition(crate::config::ControlPosition::TopLeft),
                EngineCall::InvalidateSize
            ]
        );
    }

    #[test]
    fn events_for_unknown_layers_are_ignored() {
        let mut m = manager(json!({ "map": { "center": [45, 5] } }));
        assert!(!m.handle_layer_event(LayerId(424242), OverlayEvent::Click));
        assert!(!m.reveal(LayerId(424242)));
    }
}
