use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::latlng::LatLng;

pub const DEFAULT_ZOOM: f64 = 10.0;
pub const DEFAULT_MIN_ZOOM: f64 = 4.0;
pub const DEFAULT_MAX_ZOOM: f64 = 18.0;
/// Pixel margin kept around fitted bounds.
pub const DEFAULT_BOUNDS_PADDING: [f64; 2] = [30.0, 30.0];

pub const DEFAULT_TILE_URL: &str =
    "https://cartodb-basemaps-{s}.global.ssl.fastly.net/rastertiles/voyager/{z}/{x}/{y}{r}.png";
pub const DEFAULT_TILE_ATTRIBUTION: &str = "&copy; <a href=\"https://www.openstreetmap.org/copyright\" target=\"_blank\">OpenStreetMap</a> &copy; <a href=\"https://cartodb.com/attributions\" target=\"_blank\">CartoDB</a>";

/// Corner the zoom control is docked to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ControlPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlPosition::TopLeft => "topleft",
            ControlPosition::TopRight => "topright",
            ControlPosition::BottomLeft => "bottomleft",
            ControlPosition::BottomRight => "bottomright",
        }
    }
}

/// Partial map options. Also used as the patch type for
/// [`crate::MapManager::set_map_options`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<LatLng>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_position: Option<ControlPosition>,
    /// Two-finger / ctrl-scroll gesture handling plugin toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gesture_handling: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MapOptions {
    /// Parse a loosely typed options object.
    pub fn from_json(value: Value) -> crate::error::Result<Self> {
        if !value.is_object() {
            return Err(crate::error::SmapError::invalid_option_type(
                "options",
                "an object",
            ));
        }
        serde_json::from_value(value).map_err(|_| {
            crate::error::SmapError::invalid_option_type("options", "an object of map options")
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundsOptions {
    pub padding: [f64; 2],
}

impl Default for BoundsOptions {
    fn default() -> Self {
        Self {
            padding: DEFAULT_BOUNDS_PADDING,
        }
    }
}

/// Background tile source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileLayerConfig {
    pub url: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl TileLayerConfig {
    /// Public CARTO Voyager basemap with the attribution it requires.
    pub fn basemap() -> Self {
        let mut options = Map::new();
        options.insert(
            "attribution".to_string(),
            Value::String(DEFAULT_TILE_ATTRIBUTION.to_string()),
        );
        Self {
            url: DEFAULT_TILE_URL.to_string(),
            options,
        }
    }
}

/// Caller-facing configuration; every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    #[serde(default)]
    pub map: MapOptions,
    pub bounds_options: Option<BoundsOptions>,
    /// Fit bounds automatically on every update.
    pub auto_center: Option<bool>,
    pub tile_layer: Option<TileLayerConfig>,
    pub enable_clusters: Option<bool>,
    #[serde(default)]
    pub cluster_options: Map<String, Value>,
}

/// Map options with every default applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMapOptions {
    pub center: LatLng,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_position: ControlPosition,
    pub gesture_handling: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResolvedMapOptions {
    /// Field-wise merge of a patch; `extra` is deep-merged.
    pub fn apply(&mut self, patch: &MapOptions) {
        if let Some(center) = patch.center {
            self.center = center;
        }
        if let Some(zoom) = patch.zoom {
            self.zoom = zoom;
        }
        if let Some(min_zoom) = patch.min_zoom {
            self.min_zoom = min_zoom;
        }
        if let Some(max_zoom) = patch.max_zoom {
            self.max_zoom = max_zoom;
        }
        if let Some(pos) = patch.zoom_position {
            self.zoom_position = pos;
        }
        if let Some(gh) = patch.gesture_handling {
            self.gesture_handling = gh;
        }
        merge_maps(&mut self.extra, &patch.extra);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    pub map: ResolvedMapOptions,
    pub bounds_padding: [f64; 2],
    pub auto_center: bool,
    pub tile_layer: TileLayerConfig,
    pub enable_clusters: bool,
    pub cluster_options: Map<String, Value>,
}

impl MapConfig {
    /// Apply defaults. Fails only when no initial center was given.
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        let MapConfig {
            map,
            bounds_options,
            auto_center,
            tile_layer,
            enable_clusters,
            cluster_options,
        } = self;
        let center = map.center.ok_or(ConfigError::MissingCenter)?;

        let mut clusters = Map::new();
        clusters.insert("removeOutsideVisibleBounds".to_string(), Value::Bool(true));
        merge_maps(&mut clusters, &cluster_options);

        Ok(ResolvedConfig {
            map: ResolvedMapOptions {
                center,
                zoom: map.zoom.unwrap_or(DEFAULT_ZOOM),
                min_zoom: map.min_zoom.unwrap_or(DEFAULT_MIN_ZOOM),
                max_zoom: map.max_zoom.unwrap_or(DEFAULT_MAX_ZOOM),
                zoom_position: map.zoom_position.unwrap_or_default(),
                gesture_handling: map.gesture_handling.unwrap_or(true),
                extra: map.extra,
            },
            bounds_padding: bounds_options.unwrap_or_default().padding,
            auto_center: auto_center.unwrap_or(true),
            tile_layer: tile_layer.unwrap_or_else(TileLayerConfig::basemap),
            enable_clusters: enable_clusters.unwrap_or(true),
            cluster_options: clusters,
        })
    }
}

/// Recursive object merge: nested objects merge key by key, anything else in
/// `patch` overwrites.
pub fn merge_maps(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (k, v) in patch {
        match (base.get_mut(k), v) {
            (Some(Value::Object(dst)), Value::Object(src)) => merge_maps(dst, src),
            _ => {
                base.insert(k.clone(), v.clone());
            }
        }
    }
}
