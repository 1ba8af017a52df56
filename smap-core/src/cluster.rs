use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::engine::{LayerId, MapEngine};
use crate::latlng::LatLngBounds;

/// The marker cluster and the overlay handles it has absorbed. A handle in
/// `registry` is never also a direct child of a group layer.
#[derive(Debug)]
pub struct ClusterAdapter {
    handle: LayerId,
    registry: BTreeSet<LayerId>,
}

impl ClusterAdapter {
    /// Create the cluster layer and put it on the map.
    pub fn create<E: MapEngine + ?Sized>(engine: &mut E, options: &Map<String, Value>) -> Self {
        let handle = engine.create_cluster(options);
        engine.add_to_map(handle);
        log::debug!("Smap: marker cluster {handle:?} created");
        Self {
            handle,
            registry: BTreeSet::new(),
        }
    }

    /// Register handles, skipping ones already registered.
    pub fn add_layers<E: MapEngine + ?Sized>(&mut self, engine: &mut E, layers: &[LayerId]) {
        let fresh: Vec<LayerId> = layers
            .iter()
            .copied()
            .filter(|l| self.registry.insert(*l))
            .collect();
        if !fresh.is_empty() {
            engine.cluster_add_layers(self.handle, &fresh);
        }
    }

    /// Unregister exactly the given handles; unknown ones are ignored.
    pub fn remove_layers<E: MapEngine + ?Sized>(&mut self, engine: &mut E, layers: &[LayerId]) {
        let known: Vec<LayerId> = layers
            .iter()
            .copied()
            .filter(|l| self.registry.remove(l))
            .collect();
        if !known.is_empty() {
            engine.cluster_remove_layers(self.handle, &known);
        }
    }

    pub fn bounds<E: MapEngine + ?Sized>(&self, engine: &E) -> LatLngBounds {
        engine.cluster_bounds(self.handle)
    }

    /// Remove the cluster from the map, dropping whatever is still registered.
    pub fn teardown<E: MapEngine + ?Sized>(mut self, engine: &mut E) {
        let left: Vec<LayerId> = std::mem::take(&mut self.registry).into_iter().collect();
        if !left.is_empty() {
            log::warn!("Smap: tearing down cluster with {} orphaned layers", left.len());
            engine.cluster_remove_layers(self.handle, &left);
        }
        engine.remove_from_map(self.handle);
        engine.release(self.handle);
    }

    pub fn handle(&self) -> LayerId {
        self.handle
    }

    pub fn contains(&self, layer: LayerId) -> bool {
        self.registry.contains(&layer)
    }

    pub fn registered(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.registry.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
