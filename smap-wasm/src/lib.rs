use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Object, Reflect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use smap_core::{
    AddOptions, Container, DEFAULT_GROUP, LatLng, LayerId, Listener, MapConfig, MapManager,
    MapOptions, MarkerSpec, ShapeSpec,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::Element;

mod console;
mod dispatch;
mod engine;
mod json;
mod leaflet;

use dispatch::{Dispatcher, SharedManager};
use engine::LeafletEngine;
use json::{from_js, from_js_or_default, to_js};

#[derive(Serialize)]
struct GroupSummary<'a> {
    name: &'a str,
    kind: &'a str,
    layers: Vec<LayerId>,
}

#[wasm_bindgen(start)]
pub fn start() {
    console::init();
}

/// Records that carry an `events` object of caller callbacks.
trait WithEvents: DeserializeOwned {
    fn events_mut(&mut self) -> &mut Vec<(String, Listener)>;
}

impl WithEvents for MarkerSpec {
    fn events_mut(&mut self) -> &mut Vec<(String, Listener)> {
        &mut self.events
    }
}

impl WithEvents for ShapeSpec {
    fn events_mut(&mut self) -> &mut Vec<(String, Listener)> {
        &mut self.events
    }
}

/// Pull the functions out of `record.events`; JSON drops them.
fn listeners(record: &JsValue) -> Vec<(String, Listener)> {
    let Ok(events) = Reflect::get(record, &JsValue::from_str("events")) else {
        return Vec::new();
    };
    let Some(events) = events.dyn_ref::<Object>() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for key in Object::keys(events).iter() {
        let Some(name) = key.as_string() else { continue };
        let Ok(value) = Reflect::get(events, &key) else { continue };
        match value.dyn_into::<Function>() {
            Ok(f) => {
                let event = name.clone();
                out.push((
                    name,
                    Listener::new(move |payload| {
                        if let Some(ev) = payload.downcast_ref::<JsValue>()
                            && let Err(e) = f.call1(&JsValue::NULL, ev)
                        {
                            log::error!("Smap: {event} callback threw: {e:?}");
                        }
                    }),
                ));
            }
            Err(_) => log::warn!("Smap: events.{name} is not a function"),
        }
    }
    out
}

fn records<T: WithEvents>(list: &JsValue, what: &str) -> Vec<T> {
    let Some(list) = list.dyn_ref::<Array>() else {
        log::error!("Smap: {what} must be an array");
        return Vec::new();
    };
    list.iter()
        .filter_map(|item| match from_js::<T>(&item) {
            Ok(mut record) => {
                *record.events_mut() = listeners(&item);
                Some(record)
            }
            Err(e) => {
                log::error!("Smap: {what} record skipped: {e}");
                None
            }
        })
        .collect()
}

fn add_options(options: &JsValue) -> AddOptions {
    from_js_or_default(options).unwrap_or_else(|e| {
        log::warn!("Smap: add options ignored: {e}");
        AddOptions::default()
    })
}

/// The remove calls refit the camera only when asked to with `true`.
fn update_requested(flag: Option<bool>) -> bool {
    flag == Some(true)
}

fn container_of(container: &JsValue) -> Option<Container> {
    let element = match container.as_string() {
        Some(selector) => web_sys::window()?.document()?.query_selector(&selector).ok()??,
        None => container.dyn_ref::<Element>()?.clone(),
    };
    let id = element.id();
    Some(Container {
        id: (!id.is_empty()).then_some(id),
    })
}

/// Map annotation layer exported to JavaScript.
#[wasm_bindgen]
pub struct Smap {
    manager: SharedManager,
    dispatcher: Rc<Dispatcher>,
}

impl Smap {
    /// Run `f` on the manager, then apply whatever the engine queued meanwhile.
    fn with_manager(&self, f: impl FnOnce(&mut MapManager<LeafletEngine>)) {
        match self.manager.try_borrow_mut() {
            Ok(mut m) => f(&mut m),
            Err(_) => {
                log::warn!("Smap: call ignored, map is busy");
                return;
            }
        }
        self.dispatcher.drain();
    }
}

#[wasm_bindgen]
impl Smap {
    /// `container` is an element or a selector; it must carry an `id`.
    #[wasm_bindgen(constructor)]
    pub fn new(container: JsValue, options: JsValue) -> Result<Smap, JsValue> {
        console::init();
        let config: MapConfig = from_js_or_default(&options).map_err(|e| {
            log::error!("Smap: invalid options: {e}");
            JsValue::from_str(&e)
        })?;
        let dispatcher = Rc::new(Dispatcher::default());
        let engine = LeafletEngine::new(dispatcher.clone());
        let manager = MapManager::initialize(engine, container_of(&container).as_ref(), config)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let manager = Rc::new(RefCell::new(manager));
        dispatcher.bind(&manager);
        Ok(Smap { manager, dispatcher })
    }

    /// Switch the console log level (`off`, `error`, `warn`, `info`, `debug`).
    #[wasm_bindgen(js_name = setLogLevel)]
    pub fn set_log_level(level: &str) -> bool {
        console::set_level(level)
    }

    #[wasm_bindgen(js_name = addMarkers)]
    pub fn add_markers(&self, markers: JsValue, options: JsValue, group: Option<String>) {
        let records = records::<MarkerSpec>(&markers, "marker");
        let options = add_options(&options);
        let group = group.unwrap_or_else(|| DEFAULT_GROUP.to_string());
        self.with_manager(|m| {
            m.add_markers(records, options, &group);
        });
    }

    #[wasm_bindgen(js_name = addShapes)]
    pub fn add_shapes(&self, shapes: JsValue, options: JsValue, group: Option<String>) {
        let records = records::<ShapeSpec>(&shapes, "shape");
        let options = add_options(&options);
        let group = group.unwrap_or_else(|| DEFAULT_GROUP.to_string());
        self.with_manager(|m| {
            m.add_shapes(records, options, &group);
        });
    }

    #[wasm_bindgen(js_name = removeGroup)]
    pub fn remove_group(&self, group: Option<String>, trigger_update: Option<bool>) {
        let group = group.unwrap_or_else(|| DEFAULT_GROUP.to_string());
        self.with_manager(|m| {
            m.remove_group(&group, update_requested(trigger_update));
        });
    }

    #[wasm_bindgen(js_name = removeGroups)]
    pub fn remove_groups(&self, trigger_update: Option<bool>) {
        self.with_manager(|m| {
            m.remove_groups(update_requested(trigger_update));
        });
    }

    pub fn update(&self) {
        self.with_manager(|m| {
            m.update();
        });
    }

    /// `center` is `[lat, lng]`.
    #[wasm_bindgen(js_name = setCenter)]
    pub fn set_center(&self, center: JsValue) {
        let center = from_js::<serde_json::Value>(&center)
            .and_then(|v| LatLng::from_json(&v).map_err(|e| e.to_string()));
        match center {
            Ok(center) => self.with_manager(|m| {
                m.set_center(center);
            }),
            Err(e) => log::error!("Smap: {e}"),
        }
    }

    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&self, zoom: f64) {
        self.with_manager(|m| {
            m.set_zoom(zoom);
        });
    }

    #[wasm_bindgen(js_name = setMapOptions)]
    pub fn set_map_options(&self, options: JsValue) {
        let patch = from_js::<serde_json::Value>(&options)
            .and_then(|v| MapOptions::from_json(v).map_err(|e| e.to_string()));
        match patch {
            Ok(patch) => self.with_manager(|m| {
                m.set_map_options(patch);
            }),
            Err(e) => log::error!("Smap: {e}"),
        }
    }

    /// `{ name, kind, layers }` or `null`.
    #[wasm_bindgen(js_name = getGroup)]
    pub fn get_group(&self, group: Option<String>) -> JsValue {
        let group = group.unwrap_or_else(|| DEFAULT_GROUP.to_string());
        let Ok(m) = self.manager.try_borrow() else {
            log::warn!("Smap: getGroup ignored, map is busy");
            return JsValue::NULL;
        };
        match m.get_group(&group) {
            Some(g) => to_js(&GroupSummary {
                name: g.name(),
                kind: g.kind().as_str(),
                layers: g.member_layers(),
            }),
            None => JsValue::NULL,
        }
    }

    /// Names of every group currently on the map.
    #[wasm_bindgen(js_name = getGroups)]
    pub fn get_groups(&self) -> Array {
        let Ok(m) = self.manager.try_borrow() else {
            log::warn!("Smap: getGroups ignored, map is busy");
            return Array::new();
        };
        m.groups().keys().map(|k| JsValue::from_str(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_calls_leave_the_camera_alone_by_default() {
        assert!(!update_requested(None));
        assert!(!update_requested(Some(false)));
        assert!(update_requested(Some(true)));
    }
}
