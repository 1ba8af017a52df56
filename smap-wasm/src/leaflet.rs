use js_sys::{Array, Float64Array, Function};
use wasm_bindgen::prelude::*;

#[wasm_bindgen(inline_js = r#"
const present = () => typeof L !== 'undefined';

export function has_leaflet() {
    return present() && typeof L.map === 'function';
}

export function has_marker_cluster() {
    return present() && typeof L.markerClusterGroup === 'function';
}

export function create_map(id, options) {
    return L.map(id, options);
}

export function add_tile_layer(map, url, options) {
    L.tileLayer(url, options).addTo(map);
}

export function set_view(map, lat, lng, zoom) {
    map.setView([lat, lng], zoom);
}

export function set_center(map, lat, lng) {
    map.setView([lat, lng], map.getZoom());
}

export function set_zoom(map, zoom) {
    map.setZoom(zoom);
}

export function set_zoom_position(map, position) {
    if (map.zoomControl) {
        map.zoomControl.setPosition(position);
    }
}

export function apply_map_options(map, patch) {
    L.Util.setOptions(map, patch);
    if (patch.minZoom !== undefined) map.setMinZoom(patch.minZoom);
    if (patch.maxZoom !== undefined) map.setMaxZoom(patch.maxZoom);
    if (patch.gestureHandling !== undefined && map.gestureHandling) {
        patch.gestureHandling ? map.gestureHandling.enable() : map.gestureHandling.disable();
    }
    if (patch.center !== undefined) {
        map.setView(patch.center, patch.zoom !== undefined ? patch.zoom : map.getZoom());
    } else if (patch.zoom !== undefined) {
        map.setZoom(patch.zoom);
    }
}

export function fit_bounds(map, south, west, north, east, pad_x, pad_y) {
    map.fitBounds([[south, west], [north, east]], { padding: [pad_x, pad_y] });
}

export function invalidate_size(map) {
    map.invalidateSize();
}

export function icon_factory() {
    return L.DivIcon.extend({
        createIcon(oldIcon) {
            const div = L.DivIcon.prototype.createIcon.call(this, oldIcon);
            const data = this.options.data || {};
            for (const key of Object.keys(data)) {
                div.setAttribute('data-' + key, data[key]);
            }
            return div;
        }
    });
}

export function feature_group() {
    return L.featureGroup();
}

export function add_layer(parent, layer) {
    parent.addLayer(layer);
}

export function remove_layer(parent, layer) {
    parent.removeLayer(layer);
}

export function layer_bounds(layer) {
    let b = null;
    if (typeof layer.getBounds === 'function') {
        b = layer.getBounds();
    } else if (typeof layer.getLatLng === 'function') {
        b = L.latLngBounds([layer.getLatLng()]);
    }
    if (!b || !b.isValid()) return new Float64Array(0);
    return new Float64Array([b.getSouth(), b.getWest(), b.getNorth(), b.getEast()]);
}

export function create_marker(lat, lng, factory, icon) {
    const options = factory && icon ? { icon: new factory(icon) } : {};
    return L.marker([lat, lng], options);
}

export function create_shape(geometry, style) {
    return L.geoJSON(geometry, { style: () => style });
}

export function bind_popup(layer, html, class_name, attributes) {
    const el = document.createElement('div');
    for (const key of Object.keys(attributes)) {
        el.setAttribute(key, attributes[key]);
    }
    el.className = class_name;
    el.innerHTML = html;
    layer.bindPopup(el);
}

export function open_popup(layer) {
    layer.openPopup();
}

export function close_popup(layer) {
    layer.closePopup();
}

export function set_layer_class(layer, names, on) {
    const classes = names.split(/\s+/).filter(Boolean);
    const visit = (l) => {
        if (typeof l.eachLayer === 'function') {
            l.eachLayer(visit);
        } else if (typeof l.getElement === 'function') {
            const el = l.getElement();
            if (el) classes.forEach((c) => el.classList.toggle(c, on));
        }
    };
    visit(layer);
}

export function on(layer, event, f) {
    layer.on(event, f);
}

export function off(layer, event, f) {
    layer.off(event, f);
}

export function marker_cluster(options) {
    return L.markerClusterGroup(options);
}

export function cluster_add_layers(cluster, layers) {
    cluster.addLayers(layers);
}

export function cluster_remove_layers(cluster, layers) {
    cluster.removeLayers(layers);
}

export function zoom_to_show_layer(cluster, layer, then) {
    cluster.zoomToShowLayer(layer, then || undefined);
}
"#)]
extern "C" {
    pub fn has_leaflet() -> bool;
    pub fn has_marker_cluster() -> bool;

    #[wasm_bindgen(catch)]
    pub fn create_map(id: &str, options: &JsValue) -> Result<JsValue, JsValue>;
    pub fn add_tile_layer(map: &JsValue, url: &str, options: &JsValue);
    pub fn set_view(map: &JsValue, lat: f64, lng: f64, zoom: f64);
    pub fn set_center(map: &JsValue, lat: f64, lng: f64);
    pub fn set_zoom(map: &JsValue, zoom: f64);
    pub fn set_zoom_position(map: &JsValue, position: &str);
    pub fn apply_map_options(map: &JsValue, patch: &JsValue);
    pub fn fit_bounds(map: &JsValue, south: f64, west: f64, north: f64, east: f64, pad_x: f64, pad_y: f64);
    pub fn invalidate_size(map: &JsValue);
    pub fn icon_factory() -> JsValue;

    pub fn feature_group() -> JsValue;
    pub fn add_layer(parent: &JsValue, layer: &JsValue);
    pub fn remove_layer(parent: &JsValue, layer: &JsValue);
    pub fn layer_bounds(layer: &JsValue) -> Float64Array;
    pub fn create_marker(lat: f64, lng: f64, factory: &JsValue, icon: &JsValue) -> JsValue;
    pub fn create_shape(geometry: &JsValue, style: &JsValue) -> JsValue;

    pub fn bind_popup(layer: &JsValue, html: &str, class_name: &str, attributes: &JsValue);
    pub fn open_popup(layer: &JsValue);
    pub fn close_popup(layer: &JsValue);
    pub fn set_layer_class(layer: &JsValue, names: &str, on: bool);

    pub fn on(layer: &JsValue, event: &str, f: &Function);
    pub fn off(layer: &JsValue, event: &str, f: &Function);

    pub fn marker_cluster(options: &JsValue) -> JsValue;
    pub fn cluster_add_layers(cluster: &JsValue, layers: &Array);
    pub fn cluster_remove_layers(cluster: &JsValue, layers: &Array);
    pub fn zoom_to_show_layer(cluster: &JsValue, layer: &JsValue, then: &JsValue);
}
