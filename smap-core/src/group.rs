use serde::Serialize;

use crate::cluster::ClusterAdapter;
use crate::engine::{LayerId, MapEngine};
use crate::overlay::{Overlay, OverlayPlacement};

/// Default group name used when callers don't pick one.
pub const DEFAULT_GROUP: &str = "default";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Marker,
    MarkerClustered,
    Shape,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Marker => "marker",
            GroupKind::MarkerClustered => "marker_clustered",
            GroupKind::Shape => "shape",
        }
    }
}

/// A named set of overlays sharing one feature group layer. `members`
/// mirrors what is attached to `layer` or registered with the cluster.
#[derive(Debug)]
pub struct Group {
    name: String,
    kind: GroupKind,
    layer: LayerId,
    members: Vec<Overlay>,
}

impl Group {
    pub(crate) fn create<E: MapEngine + ?Sized>(name: &str, kind: GroupKind, engine: &mut E) -> Self {
        let layer = engine.create_feature_group();
        engine.add_to_map(layer);
        log::debug!("Smap: group {name:?} ({}) created", kind.as_str());
        Self {
            name: name.to_string(),
            kind,
            layer,
            members: Vec::new(),
        }
    }

    /// Append a member, attaching it to the layer unless the cluster owns it.
    pub fn add_member<E: MapEngine + ?Sized>(&mut self, overlay: Overlay, engine: &mut E) {
        if let OverlayPlacement::Direct { group_layer } = overlay.placement() {
            engine.add_to_group(group_layer, overlay.layer());
        }
        self.members.push(overlay);
    }

    /// Detach every member from the layer or the cluster and forget them.
    pub fn remove_all_members<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        mut cluster: Option<&mut ClusterAdapter>,
    ) {
        let mut clustered = Vec::new();
        for member in &self.members {
            match member.placement() {
                OverlayPlacement::Direct { group_layer } => {
                    engine.remove_from_group(group_layer, member.layer())
                }
                OverlayPlacement::Clustered { .. } => clustered.push(member.layer()),
            }
        }
        if !clustered.is_empty() {
            match cluster.as_deref_mut() {
                Some(c) => c.remove_layers(engine, &clustered),
                None => log::warn!(
                    "Smap: group {:?} has {} clustered members but no cluster",
                    self.name,
                    clustered.len()
                ),
            }
        }
        for mut member in self.members.drain(..) {
            member.dispose(engine);
            engine.release(member.layer());
        }
    }

    /// Empty the group and take its layer off the map.
    pub(crate) fn destroy<E: MapEngine + ?Sized>(mut self, engine: &mut E, cluster: Option<&mut ClusterAdapter>) {
        self.remove_all_members(engine, cluster);
        engine.remove_from_map(self.layer);
        engine.release(self.layer);
        log::debug!("Smap: group {:?} removed", self.name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn members(&self) -> &[Overlay] {
        &self.members
    }

    pub fn member_layers(&self) -> Vec<LayerId> {
        self.members.iter().map(Overlay::layer).collect()
    }

    pub fn overlay(&self, layer: LayerId) -> Option<&Overlay> {
        self.members.iter().find(|o| o.layer() == layer)
    }

    pub(crate) fn overlay_mut(&mut self, layer: LayerId) -> Option<&mut Overlay> {
        self.members.iter_mut().find(|o| o.layer() == layer)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
