use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classes::{ClassNames, ClassRole, ClassSpec, POPUP_PREFIX};
use crate::engine::{LayerId, MapEngine};

/// Popup settings carried by a marker or shape record (`popupOptions`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PopupOptions {
    /// Open as soon as the overlay is on the map.
    pub show_popup: bool,
    pub classes: ClassSpec,
    /// Extra attributes of the content element. A `class` entry is kept
    /// alongside the popup classes.
    pub attributes: BTreeMap<String, String>,
}

/// Element the engine binds as popup content.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupContent {
    pub html: String,
    pub class_name: String,
    pub attributes: BTreeMap<String, String>,
}

/// Popup bound to exactly one overlay layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Popup {
    layer: LayerId,
    content: Option<PopupContent>,
    open_on_load: bool,
}

impl Popup {
    /// Build the content element and bind it to `layer`. Without content
    /// nothing is bound and the popup stays inert.
    pub fn bind<E: MapEngine + ?Sized>(
        layer: LayerId,
        html: Option<&str>,
        options: &PopupOptions,
        engine: &mut E,
    ) -> Self {
        let content = html.map(|html| {
            let classes = ClassNames::resolve(&options.classes, POPUP_PREFIX);
            let mut attributes = options.attributes.clone();
            let extra = attributes.remove("class").unwrap_or_default();
            let class_name = format!("{} {}", extra, classes.get(ClassRole::Base))
                .trim()
                .to_string();
            PopupContent {
                html: html.to_string(),
                class_name,
                attributes,
            }
        });
        if let Some(c) = &content {
            engine.bind_popup(layer, c);
        }
        Self {
            layer,
            content,
            open_on_load: options.show_popup,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.content.is_some()
    }

    pub fn content(&self) -> Option<&PopupContent> {
        self.content.as_ref()
    }

    pub fn is_open_on_load(&self) -> bool {
        self.open_on_load
    }

    pub fn open<E: MapEngine + ?Sized>(&self, engine: &mut E) {
        if self.is_bound() {
            engine.open_popup(self.layer);
        }
    }

    pub fn close<E: MapEngine + ?Sized>(&self, engine: &mut E) {
        if self.is_bound() {
            engine.close_popup(self.layer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{EngineCall, HeadlessEngine};
    use crate::latlng::LatLng;

    #[test]
    fn content_carries_popup_and_caller_classes() {
        let mut engine = HeadlessEngine::new();
        let layer = engine.create_marker(LatLng::new(0.0, 0.0), None);
        let mut options = PopupOptions::default();
        options.attributes.insert("class".into(), "card".into());
        options.attributes.insert("role".into(), "dialog".into());

        let popup = Popup::bind(layer, Some("<b>Hi</b>"), &options, &mut engine);
        let content = popup.content().unwrap();
        assert_eq!(content.class_name, "card smap-popup smap-popup--default");
        assert_eq!(content.attributes.get("role").map(String::as_str), Some("dialog"));
        assert!(!content.attributes.contains_key("class"));
        assert_eq!(engine.layer(layer).unwrap().popup.as_ref(), Some(content));
    }

    #[test]
    fn popup_without_content_is_inert() {
        let mut engine = HeadlessEngine::new();
        let layer = engine.create_marker(LatLng::new(0.0, 0.0), None);
        engine.take_calls();

        let popup = Popup::bind(layer, None, &PopupOptions::default(), &mut engine);
        popup.open(&mut engine);
        popup.close(&mut engine);
        assert!(!popup.is_bound());
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn open_and_close_delegate_to_engine() {
        let mut engine = HeadlessEngine::new();
        let layer = engine.create_marker(LatLng::new(0.0, 0.0), None);
        let popup = Popup::bind(layer, Some("x"), &PopupOptions::default(), &mut engine);
        engine.take_calls();

        popup.open(&mut engine);
        assert!(engine.is_popup_open(layer));
        popup.close(&mut engine);
        assert!(!engine.is_popup_open(layer));
        assert_eq!(
            engine.calls(),
            &[EngineCall::OpenPopup(layer), EngineCall::ClosePopup(layer)]
        );
    }
}
