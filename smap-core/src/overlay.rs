use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classes::{ClassNames, ClassRole, ClassSpec, MARKER_PREFIX, SHAPE_PREFIX};
use crate::engine::{
    ClassTarget, IconFactoryId, LayerId, Listener, MapEngine, OverlayEvent, RevealFollowUp,
    TimerId,
};
use crate::error::{Result, SmapError};
use crate::latlng::{LatLng, LatLngBounds, ShapeGeometry};
use crate::popup::{Popup, PopupOptions};

/// Hover/focus triggers wait this long before revealing an overlay.
pub const REVEAL_DELAY: Duration = Duration::from_millis(600);

pub const DEFAULT_SOURCE_EVENT: &str = "mouseenter focus";
pub const DEFAULT_SOURCE_SELECTOR: &str = ".js-map-trigger";

/// Custom marker icon as given by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IconSpec {
    pub html: Option<String>,
    /// Copied onto the icon element as `data-*` attributes.
    pub data: BTreeMap<String, Value>,
    pub icon_size: [u32; 2],
    pub icon_anchor: Option<[i32; 2]>,
    pub popup_anchor: Option<[i32; 2]>,
}

impl Default for IconSpec {
    fn default() -> Self {
        Self {
            html: None,
            data: BTreeMap::new(),
            icon_size: [50, 50],
            icon_anchor: None,
            popup_anchor: None,
        }
    }
}

/// Icon with anchors and class name filled in, handed to the engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IconOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    pub data: BTreeMap<String, String>,
    pub icon_size: [u32; 2],
    pub icon_anchor: [i32; 2],
    pub popup_anchor: [i32; 2],
    pub class_name: String,
}

impl IconSpec {
    /// Anchor the icon at its bottom center and float the popup above it.
    pub fn resolve(&self, class_name: &str) -> IconOptions {
        let [w, h] = self.icon_size;
        let icon_anchor = self.icon_anchor.unwrap_or([(w / 2) as i32, h as i32]);
        let popup_anchor = self
            .popup_anchor
            .unwrap_or([0, -((h as f64 / 1.5).floor() as i32)]);
        let data = self
            .data
            .iter()
            .filter_map(|(k, v)| {
                let v = match v {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((k.clone(), v))
            })
            .collect();
        IconOptions {
            html: self.html.clone(),
            data,
            icon_size: self.icon_size,
            icon_anchor,
            popup_anchor,
            class_name: class_name.to_string(),
        }
    }
}

/// Link between an overlay and an external element (e.g. a sidebar entry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLink {
    /// Selector of the source element.
    pub container: String,
    /// DOM events on matching descendants that trigger a reveal.
    pub events: Vec<String>,
    /// Descendants of the source element that act as triggers.
    pub selector: String,
}

impl SourceLink {
    pub fn new(container: &str, events: &str, selector: &str) -> Self {
        Self {
            container: container.to_string(),
            events: events.split_whitespace().map(str::to_string).collect(),
            selector: selector.to_string(),
        }
    }
}

/// Fields shared by marker and shape records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InteractionSpec {
    pub popup: Option<String>,
    pub popup_options: PopupOptions,
    pub center_on_focus: bool,
    pub source_container: Option<String>,
    pub source_container_event: String,
    pub source_container_selector: String,
    pub classes: ClassSpec,
}

impl Default for InteractionSpec {
    fn default() -> Self {
        Self {
            popup: None,
            popup_options: PopupOptions::default(),
            center_on_focus: true,
            source_container: None,
            source_container_event: DEFAULT_SOURCE_EVENT.to_string(),
            source_container_selector: DEFAULT_SOURCE_SELECTOR.to_string(),
            classes: ClassSpec::default(),
        }
    }
}

impl InteractionSpec {
    fn source_link(&self) -> Option<SourceLink> {
        self.source_container.as_deref().map(|c| {
            SourceLink::new(c, &self.source_container_event, &self.source_container_selector)
        })
    }
}

/// One marker record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerSpec {
    pub position: Option<LatLng>,
    /// `false` keeps the engine's stock marker icon.
    pub custom_icon: bool,
    pub icon: IconSpec,
    #[serde(flatten)]
    pub interaction: InteractionSpec,
    /// Caller callbacks keyed by engine event name.
    #[serde(skip)]
    pub events: Vec<(String, Listener)>,
}

impl Default for MarkerSpec {
    fn default() -> Self {
        Self {
            position: None,
            custom_icon: true,
            icon: IconSpec::default(),
            interaction: InteractionSpec::default(),
            events: Vec::new(),
        }
    }
}

impl MarkerSpec {
    pub fn at(position: LatLng) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }
}

/// One shape record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShapeSpec {
    /// Only `"geojson"` is understood.
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Option<ShapeGeometry>,
    /// Path style passed through to the engine.
    pub style: Map<String, Value>,
    #[serde(flatten)]
    pub interaction: InteractionSpec,
    #[serde(skip)]
    pub events: Vec<(String, Listener)>,
}

impl Default for ShapeSpec {
    fn default() -> Self {
        Self {
            kind: "geojson".to_string(),
            geometry: None,
            style: Map::new(),
            interaction: InteractionSpec::default(),
            events: Vec::new(),
        }
    }
}

impl ShapeSpec {
    pub fn from_geometry(geometry: ShapeGeometry) -> Self {
        Self {
            geometry: Some(geometry),
            ..Default::default()
        }
    }
}

/// Who owns an overlay's visual handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayPlacement {
    /// Child of its group's feature group layer.
    Direct { group_layer: LayerId },
    /// Registered with the marker cluster.
    Clustered { cluster: LayerId },
}

#[derive(Clone, Debug, PartialEq)]
pub enum OverlayKind {
    Marker {
        position: LatLng,
        icon: Option<IconOptions>,
    },
    Shape {
        geometry: ShapeGeometry,
        bounds: LatLngBounds,
    },
}

/// Activity on a linked source element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceTrigger {
    /// One of the configured trigger events fired.
    Activate { event: String },
    /// The pointer left the trigger element.
    Leave,
}

/// A marker or shape living in exactly one group.
#[derive(Debug)]
pub struct Overlay {
    layer: LayerId,
    kind: OverlayKind,
    placement: OverlayPlacement,
    classes: ClassNames,
    popup: Option<Popup>,
    center_on_focus: bool,
    source: Option<SourceLink>,
    pending_reveal: Option<TimerId>,
}

impl Overlay {
    /// Validate a marker record and create its engine handle. Nothing is
    /// created when validation fails.
    pub fn marker<E: MapEngine + ?Sized>(
        spec: MarkerSpec,
        placement: OverlayPlacement,
        icon_factory: Option<IconFactoryId>,
        engine: &mut E,
    ) -> Result<Self> {
        if !engine.is_available() {
            return Err(SmapError::missing_dependency("map engine"));
        }
        let position = spec
            .position
            .ok_or_else(|| SmapError::invalid_position("missing required position parameter as array"))?;
        if !position.is_valid() {
            return Err(SmapError::invalid_position(format!("{position:?}")));
        }

        let classes = ClassNames::resolve(&spec.interaction.classes, MARKER_PREFIX);
        let icon = spec
            .custom_icon
            .then(|| spec.icon.resolve(classes.get(ClassRole::Base)));
        let layer = match (&icon, icon_factory) {
            (Some(icon), Some(factory)) => engine.create_marker(position, Some((icon, factory))),
            _ => engine.create_marker(position, None),
        };

        let overlay = Self::wire(
            layer,
            OverlayKind::Marker { position, icon },
            placement,
            classes,
            &spec.interaction,
            &spec.events,
            engine,
        );
        log::debug!("Smap: marker {layer:?} created at {position:?}");
        Ok(overlay)
    }

    /// Validate a shape record and create its engine handle.
    pub fn shape<E: MapEngine + ?Sized>(
        spec: ShapeSpec,
        placement: OverlayPlacement,
        engine: &mut E,
    ) -> Result<Self> {
        if !engine.is_available() {
            return Err(SmapError::missing_dependency("map engine"));
        }
        if spec.kind != "geojson" {
            return Err(SmapError::invalid_geometry(format!(
                "unsupported shape type {:?}",
                spec.kind
            )));
        }
        let geometry = spec
            .geometry
            .ok_or_else(|| SmapError::invalid_geometry("missing required geometry parameter"))?;
        let bounds = geometry.bounds()?;

        let layer = engine.create_shape(&geometry, &spec.style);
        let classes = ClassNames::resolve(&spec.interaction.classes, SHAPE_PREFIX);
        let overlay = Self::wire(
            layer,
            OverlayKind::Shape { geometry, bounds },
            placement,
            classes,
            &spec.interaction,
            &spec.events,
            engine,
        );
        log::debug!("Smap: shape {layer:?} created");
        Ok(overlay)
    }

    fn wire<E: MapEngine + ?Sized>(
        layer: LayerId,
        kind: OverlayKind,
        placement: OverlayPlacement,
        classes: ClassNames,
        interaction: &InteractionSpec,
        events: &[(String, Listener)],
        engine: &mut E,
    ) -> Self {
        let popup = interaction
            .popup
            .as_deref()
            .map(|html| Popup::bind(layer, Some(html), &interaction.popup_options, engine));

        engine.subscribe(layer, &OverlayEvent::ALL);
        let source = interaction.source_link();
        if let Some(link) = &source {
            engine.watch_source(layer, link);
        }
        for (event, listener) in events {
            engine.attach_listener(layer, event, listener);
        }

        Self {
            layer,
            kind,
            placement,
            classes,
            popup,
            center_on_focus: interaction.center_on_focus,
            source,
            pending_reveal: None,
        }
    }

    /// Called once the handle is on the map (directly or through the cluster).
    pub(crate) fn on_attached<E: MapEngine + ?Sized>(&self, engine: &mut E) {
        if matches!(self.kind, OverlayKind::Shape { .. }) {
            engine.set_class(ClassTarget::Layer(self.layer), self.classes.get(ClassRole::Base), true);
        }
        if let Some(popup) = &self.popup
            && popup.is_open_on_load()
        {
            popup.open(engine);
        }
    }

    /// React to one of the overlay's own engine events.
    pub fn handle_event<E: MapEngine + ?Sized>(&mut self, event: OverlayEvent, engine: &mut E) {
        let me = ClassTarget::Layer(self.layer);
        match event {
            OverlayEvent::Click => {
                if self.center_on_focus
                    && let Some(position) = self.position()
                {
                    engine.set_center(position);
                }
            }
            OverlayEvent::MouseOver => engine.set_class(me, self.classes.get(ClassRole::Focused), true),
            OverlayEvent::MouseOut => engine.set_class(me, self.classes.get(ClassRole::Focused), false),
            OverlayEvent::PopupOpen | OverlayEvent::PopupClose => {
                let on = event == OverlayEvent::PopupOpen;
                let active = self.classes.get(ClassRole::Active);
                engine.set_class(me, active, on);
                if let Some(link) = &self.source {
                    engine.set_class(ClassTarget::Source(&link.container), active, on);
                }
            }
        }
    }

    /// React to activity on the linked source element. Click reveals at once;
    /// every other trigger is debounced and a leave cancels it.
    pub fn handle_source_trigger<E: MapEngine + ?Sized>(
        &mut self,
        trigger: SourceTrigger,
        engine: &mut E,
    ) {
        if self.source.is_none() {
            return;
        }
        self.cancel_pending(engine);
        match trigger {
            SourceTrigger::Activate { event } if event == "click" => self.reveal(engine),
            SourceTrigger::Activate { .. } => {
                self.pending_reveal = Some(engine.schedule_reveal(self.layer, REVEAL_DELAY));
            }
            SourceTrigger::Leave => {}
        }
    }

    /// Run a debounced reveal. Stale timers are ignored.
    pub fn run_scheduled_reveal<E: MapEngine + ?Sized>(&mut self, timer: TimerId, engine: &mut E) {
        if self.pending_reveal != Some(timer) {
            log::debug!("Smap: ignoring stale reveal timer {timer:?} for {:?}", self.layer);
            return;
        }
        self.pending_reveal = None;
        self.reveal(engine);
    }

    /// Bring the overlay into view through the cluster if it is clustered,
    /// then open its popup.
    pub fn reveal<E: MapEngine + ?Sized>(&self, engine: &mut E) {
        let has_popup = self.popup.as_ref().is_some_and(Popup::is_bound);
        match self.placement {
            OverlayPlacement::Clustered { cluster } if self.center_on_focus => {
                let then = if has_popup {
                    RevealFollowUp::OpenPopup
                } else {
                    RevealFollowUp::Nothing
                };
                engine.zoom_to_show_layer(cluster, self.layer, then);
            }
            _ => {
                if let Some(popup) = &self.popup {
                    popup.open(engine);
                }
            }
        }
    }

    fn cancel_pending<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        if let Some(timer) = self.pending_reveal.take() {
            engine.cancel_timer(timer);
        }
    }

    /// Drop timers and source listeners; the handle itself is released by
    /// the owning group.
    pub(crate) fn dispose<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        self.cancel_pending(engine);
        if let Some(link) = &self.source {
            engine.unwatch_source(self.layer, link);
        }
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn kind(&self) -> &OverlayKind {
        &self.kind
    }

    pub fn placement(&self) -> OverlayPlacement {
        self.placement
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn source(&self) -> Option<&SourceLink> {
        self.source.as_ref()
    }

    pub fn pending_reveal(&self) -> Option<TimerId> {
        self.pending_reveal
    }

    pub fn class_name(&self, role: ClassRole) -> &str {
        self.classes.get(role)
    }

    /// Marker position; `None` for shapes.
    pub fn position(&self) -> Option<LatLng> {
        match &self.kind {
            OverlayKind::Marker { position, .. } => Some(*position),
            OverlayKind::Shape { .. } => None,
        }
    }

    pub fn icon(&self) -> Option<&IconOptions> {
        match &self.kind {
            OverlayKind::Marker { icon, .. } => icon.as_ref(),
            OverlayKind::Shape { .. } => None,
        }
    }

    pub fn bounds(&self) -> LatLngBounds {
        match &self.kind {
            OverlayKind::Marker { position, .. } => LatLngBounds::from_point(*position),
            OverlayKind::Shape { bounds, .. } => *bounds,
        }
    }
}
