use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use js_sys::{Array, Function};
use serde_json::{Map, Value};
use smap_core::config::{ResolvedMapOptions, TileLayerConfig};
use smap_core::{
    ClassTarget, ClusterBackend, ControlPosition, IconFactoryId, IconOptions, LatLng,
    LatLngBounds, LayerId, Listener, MapEngine, MapOptions, OverlayEvent, PopupContent,
    RevealFollowUp, ShapeGeometry, SourceLink, SourceTrigger, TimerId,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Element, Event, MouseEvent, Node};

use crate::dispatch::{Dispatch, Dispatcher};
use crate::json::to_js;
use crate::leaflet;

type LayerCallback = Closure<dyn FnMut(JsValue)>;
type DomCallback = Closure<dyn FnMut(Event)>;
type TimerCallback = Closure<dyn FnMut()>;

struct SourceBinding {
    element: Element,
    event: String,
    callback: DomCallback,
}

/// A Leaflet object plus every callback we hung on it.
struct Entry {
    handle: JsValue,
    callbacks: Vec<(String, LayerCallback)>,
    sources: Vec<SourceBinding>,
}

impl Entry {
    fn new(handle: JsValue) -> Self {
        Self {
            handle,
            callbacks: Vec::new(),
            sources: Vec::new(),
        }
    }

    fn detach_sources(&mut self) {
        for b in self.sources.drain(..) {
            let _ = b
                .element
                .remove_event_listener_with_callback(&b.event, b.callback.as_ref().unchecked_ref());
        }
    }
}

/// [`MapEngine`] over Leaflet and Leaflet.markercluster.
pub struct LeafletEngine {
    dispatcher: Rc<Dispatcher>,
    map: Option<JsValue>,
    icon_factory: Option<JsValue>,
    next_id: u32,
    next_timer: u32,
    layers: HashMap<LayerId, Entry>,
    timers: Timers<TimerCallback>,
}

/// Browser timeout handles and the callbacks they will run.
///
/// A fired callback is parked in `spent` rather than dropped because the
/// drop usually happens from inside that same callback; it is freed when the
/// next timer fires.
struct Timers<C> {
    live: HashMap<TimerId, (i32, C)>,
    spent: Option<C>,
}

impl<C> Default for Timers<C> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            spent: None,
        }
    }
}

impl<C> Timers<C> {
    fn insert(&mut self, timer: TimerId, handle: i32, callback: C) {
        self.live.insert(timer, (handle, callback));
    }

    fn fired(&mut self, timer: TimerId) {
        if let Some((_, cb)) = self.live.remove(&timer) {
            self.spent = Some(cb);
        }
    }

    /// The browser handle to clear; the callback is dropped here.
    fn cancel(&mut self, timer: TimerId) -> Option<i32> {
        self.live.remove(&timer).map(|(handle, _)| handle)
    }
}

/// Non-bubbling DOM events are listened for through their bubbling twin so
/// one listener on the source element covers every trigger inside it.
fn delegated(event: &str) -> &str {
    match event {
        "mouseenter" => "mouseover",
        "mouseleave" => "mouseout",
        "focus" => "focusin",
        "blur" => "focusout",
        other => other,
    }
}

fn query_all(selector: &str) -> Vec<Element> {
    let Some(doc) = web_sys::window().and_then(|w| w.document()) else {
        return Vec::new();
    };
    let Ok(list) = doc.query_selector_all(selector) else {
        log::warn!("Smap: invalid selector {selector:?}");
        return Vec::new();
    };
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|n| n.dyn_into::<Element>().ok())
        .collect()
}

/// The trigger element an event is for, or `None` when the pointer only
/// moved between descendants of the same trigger.
fn trigger_hit(ev: &Event, container: &Element, selector: &str) -> Option<Element> {
    let target = ev.target()?.dyn_into::<Element>().ok()?;
    let hit = target.closest(selector).ok()??;
    let hit_node: &Node = &hit;
    if !container.contains(Some(hit_node)) {
        return None;
    }
    if let Some(me) = ev.dyn_ref::<MouseEvent>()
        && let Some(related) = me.related_target()
        && let Ok(node) = related.dyn_into::<Node>()
        && hit.contains(Some(&node))
    {
        return None;
    }
    Some(hit)
}

impl LeafletEngine {
    pub fn new(dispatcher: Rc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            map: None,
            icon_factory: None,
            next_id: 1,
            next_timer: 1,
            layers: HashMap::new(),
            timers: Timers::default(),
        }
    }

    /// Forget a timer the browser has already run.
    pub fn timer_fired(&mut self, timer: TimerId) {
        self.timers.fired(timer);
    }

    fn alloc(&mut self, handle: JsValue) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.layers.insert(id, Entry::new(handle));
        id
    }

    fn handle(&self, id: LayerId) -> Option<&JsValue> {
        let h = self.layers.get(&id).map(|e| &e.handle);
        if h.is_none() {
            log::warn!("Smap: unknown layer {id:?}");
        }
        h
    }

    fn with_map(&self, f: impl FnOnce(&JsValue)) {
        match &self.map {
            Some(map) => f(map),
            None => log::warn!("Smap: map is not created"),
        }
    }

    fn handles(&self, layers: &[LayerId]) -> Array {
        layers.iter().filter_map(|l| self.handle(*l)).collect()
    }
}

impl ClusterBackend for LeafletEngine {
    fn has_cluster_library(&self) -> bool {
        leaflet::has_marker_cluster()
    }

    fn create_cluster(&mut self, options: &Map<String, Value>) -> LayerId {
        let handle = leaflet::marker_cluster(&to_js(options));
        self.alloc(handle)
    }

    fn cluster_add_layers(&mut self, cluster: LayerId, layers: &[LayerId]) {
        let members = self.handles(layers);
        if let Some(c) = self.handle(cluster) {
            leaflet::cluster_add_layers(c, &members);
        }
    }

    fn cluster_remove_layers(&mut self, cluster: LayerId, layers: &[LayerId]) {
        let members = self.handles(layers);
        if let Some(c) = self.handle(cluster) {
            leaflet::cluster_remove_layers(c, &members);
        }
    }

    fn cluster_bounds(&self, cluster: LayerId) -> LatLngBounds {
        self.layer_bounds(cluster)
    }

    fn zoom_to_show_layer(&mut self, cluster: LayerId, layer: LayerId, then: RevealFollowUp) {
        let (Some(c), Some(l)) = (self.handle(cluster), self.handle(layer)) else {
            return;
        };
        let follow_up = match then {
            RevealFollowUp::OpenPopup => {
                let target = l.clone();
                Closure::once_into_js(move || leaflet::open_popup(&target))
            }
            RevealFollowUp::Nothing => JsValue::NULL,
        };
        leaflet::zoom_to_show_layer(c, l, &follow_up);
    }
}

impl MapEngine for LeafletEngine {
    fn is_available(&self) -> bool {
        leaflet::has_leaflet()
    }

    fn create_map(&mut self, container_id: &str, options: &ResolvedMapOptions) {
        match leaflet::create_map(container_id, &to_js(options)) {
            Ok(map) => self.map = Some(map),
            Err(e) => log::error!("Smap: map creation on #{container_id} failed: {e:?}"),
        }
    }

    fn add_tile_layer(&mut self, tile: &TileLayerConfig) {
        self.with_map(|m| leaflet::add_tile_layer(m, &tile.url, &to_js(&tile.options)));
    }

    fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.with_map(|m| leaflet::set_view(m, center.lat, center.lng, zoom));
    }

    fn set_center(&mut self, center: LatLng) {
        self.with_map(|m| leaflet::set_center(m, center.lat, center.lng));
    }

    fn set_zoom(&mut self, zoom: f64) {
        self.with_map(|m| leaflet::set_zoom(m, zoom));
    }

    fn set_zoom_control_position(&mut self, position: ControlPosition) {
        self.with_map(|m| leaflet::set_zoom_position(m, position.as_str()));
    }

    fn apply_map_options(&mut self, patch: &MapOptions) {
        self.with_map(|m| leaflet::apply_map_options(m, &to_js(patch)));
    }

    fn fit_bounds(&mut self, bounds: &LatLngBounds, padding: [f64; 2]) {
        let (Some(sw), Some(ne)) = (bounds.south_west(), bounds.north_east()) else {
            return;
        };
        self.with_map(|m| leaflet::fit_bounds(m, sw.lat, sw.lng, ne.lat, ne.lng, padding[0], padding[1]));
    }

    fn invalidate_size(&mut self) {
        self.with_map(leaflet::invalidate_size);
    }

    fn install_icon_factory(&mut self) -> IconFactoryId {
        self.icon_factory = Some(leaflet::icon_factory());
        IconFactoryId(1)
    }

    fn create_feature_group(&mut self) -> LayerId {
        self.alloc(leaflet::feature_group())
    }

    fn add_to_map(&mut self, layer: LayerId) {
        if let Some(l) = self.handle(layer) {
            self.with_map(|m| leaflet::add_layer(m, l));
        }
    }

    fn remove_from_map(&mut self, layer: LayerId) {
        if let Some(l) = self.handle(layer) {
            self.with_map(|m| leaflet::remove_layer(m, l));
        }
    }

    fn add_to_group(&mut self, group: LayerId, layer: LayerId) {
        if let (Some(g), Some(l)) = (self.handle(group), self.handle(layer)) {
            leaflet::add_layer(g, l);
        }
    }

    fn remove_from_group(&mut self, group: LayerId, layer: LayerId) {
        if let (Some(g), Some(l)) = (self.handle(group), self.handle(layer)) {
            leaflet::remove_layer(g, l);
        }
    }

    fn layer_bounds(&self, layer: LayerId) -> LatLngBounds {
        let Some(l) = self.handle(layer) else {
            return LatLngBounds::empty();
        };
        match leaflet::layer_bounds(l).to_vec().as_slice() {
            [south, west, north, east] => {
                LatLngBounds::from_corners(LatLng::new(*south, *west), LatLng::new(*north, *east))
            }
            _ => LatLngBounds::empty(),
        }
    }

    fn create_marker(&mut self, position: LatLng, icon: Option<(&IconOptions, IconFactoryId)>) -> LayerId {
        let handle = match (icon, &self.icon_factory) {
            (Some((options, _)), Some(factory)) => {
                leaflet::create_marker(position.lat, position.lng, factory, &to_js(options))
            }
            _ => leaflet::create_marker(position.lat, position.lng, &JsValue::NULL, &JsValue::NULL),
        };
        self.alloc(handle)
    }

    fn create_shape(&mut self, geometry: &ShapeGeometry, style: &Map<String, Value>) -> LayerId {
        let handle = leaflet::create_shape(&to_js(geometry), &to_js(style));
        self.alloc(handle)
    }

    fn release(&mut self, layer: LayerId) {
        let Some(mut entry) = self.layers.remove(&layer) else {
            return;
        };
        for (event, cb) in &entry.callbacks {
            leaflet::off(&entry.handle, event, cb.as_ref().unchecked_ref());
        }
        entry.detach_sources();
    }

    fn bind_popup(&mut self, layer: LayerId, content: &PopupContent) {
        if let Some(l) = self.handle(layer) {
            leaflet::bind_popup(l, &content.html, &content.class_name, &to_js(&content.attributes));
        }
    }

    fn open_popup(&mut self, layer: LayerId) {
        if let Some(l) = self.handle(layer) {
            leaflet::open_popup(l);
        }
    }

    fn close_popup(&mut self, layer: LayerId) {
        if let Some(l) = self.handle(layer) {
            leaflet::close_popup(l);
        }
    }

    fn set_class(&mut self, target: ClassTarget<'_>, class: &str, enabled: bool) {
        match target {
            ClassTarget::Layer(id) => {
                if let Some(l) = self.handle(id) {
                    leaflet::set_layer_class(l, class, enabled);
                }
            }
            ClassTarget::Source(selector) => {
                for el in query_all(selector) {
                    let list = el.class_list();
                    for name in class.split_whitespace() {
                        let _ = list.toggle_with_force(name, enabled);
                    }
                }
            }
        }
    }

    fn subscribe(&mut self, layer: LayerId, events: &[OverlayEvent]) {
        let dispatcher = self.dispatcher.clone();
        let Some(entry) = self.layers.get_mut(&layer) else {
            return;
        };
        for &event in events {
            let d = dispatcher.clone();
            let cb = LayerCallback::wrap(Box::new(move |_ev: JsValue| {
                d.send(Dispatch::Layer { layer, event });
            }));
            leaflet::on(&entry.handle, event.as_str(), cb.as_ref().unchecked_ref());
            entry.callbacks.push((event.as_str().to_string(), cb));
        }
    }

    fn attach_listener(&mut self, layer: LayerId, event: &str, listener: &Listener) {
        let Some(entry) = self.layers.get_mut(&layer) else {
            return;
        };
        let l = listener.clone();
        let cb = LayerCallback::wrap(Box::new(move |ev: JsValue| l.call(&ev)));
        leaflet::on(&entry.handle, event, cb.as_ref().unchecked_ref());
        entry.callbacks.push((event.to_string(), cb));
    }

    fn watch_source(&mut self, layer: LayerId, link: &SourceLink) {
        let dispatcher = self.dispatcher.clone();
        let Some(entry) = self.layers.get_mut(&layer) else {
            return;
        };
        let mut triggers: Vec<(String, SourceTrigger)> = link
            .events
            .iter()
            .map(|e| (e.clone(), SourceTrigger::Activate { event: e.clone() }))
            .collect();
        triggers.push(("mouseleave".to_string(), SourceTrigger::Leave));

        for container in query_all(&link.container) {
            for (event, trigger) in &triggers {
                let dom_event = delegated(event);
                let d = dispatcher.clone();
                let trigger = trigger.clone();
                let selector = link.selector.clone();
                let scope = container.clone();
                let callback = DomCallback::wrap(Box::new(move |ev: Event| {
                    if trigger_hit(&ev, &scope, &selector).is_some() {
                        d.send(Dispatch::Source {
                            layer,
                            trigger: trigger.clone(),
                        });
                    }
                }));
                if container
                    .add_event_listener_with_callback(dom_event, callback.as_ref().unchecked_ref())
                    .is_ok()
                {
                    entry.sources.push(SourceBinding {
                        element: container.clone(),
                        event: dom_event.to_string(),
                        callback,
                    });
                }
            }
        }
    }

    fn unwatch_source(&mut self, layer: LayerId, _link: &SourceLink) {
        if let Some(entry) = self.layers.get_mut(&layer) {
            entry.detach_sources();
        }
    }

    fn schedule_reveal(&mut self, layer: LayerId, delay: Duration) -> TimerId {
        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        let d = self.dispatcher.clone();
        let cb: TimerCallback = Closure::once(move || d.send(Dispatch::Timer { layer, timer }));
        let scheduled = web_sys::window().map(|w| {
            w.set_timeout_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref::<Function>(),
                delay.as_millis() as i32,
            )
        });
        match scheduled {
            Some(Ok(handle)) => {
                self.timers.insert(timer, handle, cb);
            }
            _ => log::error!("Smap: could not schedule reveal of {layer:?}"),
        }
        timer
    }

    fn cancel_timer(&mut self, timer: TimerId) {
        if let Some(handle) = self.timers.cancel(timer)
            && let Some(w) = web_sys::window()
        {
            w.clear_timeout_with_handle(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_callbacks_are_freed_on_cancel_and_after_the_next_fire() {
        let cb = Rc::new(());
        let mut timers = Timers::default();
        timers.insert(TimerId(1), 11, cb.clone());
        timers.insert(TimerId(2), 12, cb.clone());
        timers.insert(TimerId(3), 13, cb.clone());
        assert_eq!(Rc::strong_count(&cb), 4);

        assert_eq!(timers.cancel(TimerId(1)), Some(11));
        assert_eq!(timers.cancel(TimerId(1)), None);
        assert_eq!(Rc::strong_count(&cb), 3);

        timers.fired(TimerId(2));
        assert_eq!(Rc::strong_count(&cb), 3);
        timers.fired(TimerId(3));
        assert_eq!(Rc::strong_count(&cb), 2);
        assert!(timers.live.is_empty());
    }
}
