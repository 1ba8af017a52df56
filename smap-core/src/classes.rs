use serde::{Deserialize, Serialize};

pub const MARKER_PREFIX: &str = "smap-marker";
pub const SHAPE_PREFIX: &str = "smap-shape";
pub const POPUP_PREFIX: &str = "smap-popup";

const LAYER_TEMPLATE: &str = "{prefix}--default";
const FOCUSED: &str = "is-focused";
const ACTIVE: &str = "is-active";

/// Presentation state an overlay can put its element into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassRole {
    /// Always present: `"<prefix> <layer>"`.
    Base,
    /// While the pointer is over the overlay.
    Focused,
    /// While the overlay's popup is open.
    Active,
}

/// Caller overrides. `{prefix}` in any value is replaced by the prefix.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassSpec {
    pub prefix: Option<String>,
    pub layer: Option<String>,
    pub focused: Option<String>,
    pub active: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNames {
    base: String,
    focused: String,
    active: String,
}

impl ClassNames {
    pub fn resolve(spec: &ClassSpec, default_prefix: &str) -> Self {
        let prefix = spec.prefix.as_deref().unwrap_or(default_prefix);
        let expand = |v: Option<&str>, fallback: &str| v.unwrap_or(fallback).replacen("{prefix}", prefix, 1);
        let layer = expand(spec.layer.as_deref(), LAYER_TEMPLATE);
        Self {
            base: format!("{prefix} {layer}").trim().to_string(),
            focused: expand(spec.focused.as_deref(), FOCUSED),
            active: expand(spec.active.as_deref(), ACTIVE),
        }
    }

    pub fn get(&self, role: ClassRole) -> &str {
        match role {
            ClassRole::Base => &self.base,
            ClassRole::Focused => &self.focused,
            ClassRole::Active => &self.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_prefix() {
        let c = ClassNames::resolve(&ClassSpec::default(), MARKER_PREFIX);
        assert_eq!(c.get(ClassRole::Base), "smap-marker smap-marker--default");
        assert_eq!(c.get(ClassRole::Focused), "is-focused");
        assert_eq!(c.get(ClassRole::Active), "is-active");
    }

    #[test]
    fn prefix_override_reaches_layer_template() {
        let spec = ClassSpec {
            prefix: Some("poi".into()),
            layer: Some("{prefix}--museum".into()),
            focused: Some("{prefix}--hover".into()),
            ..Default::default()
        };
        let c = ClassNames::resolve(&spec, SHAPE_PREFIX);
        assert_eq!(c.get(ClassRole::Base), "poi poi--museum");
        assert_eq!(c.get(ClassRole::Focused), "poi--hover");
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let spec: ClassSpec = serde_json::from_str(r#"{"active":"open"}"#).unwrap();
        let c = ClassNames::resolve(&spec, POPUP_PREFIX);
        assert_eq!(c.get(ClassRole::Base), "smap-popup smap-popup--default");
        assert_eq!(c.get(ClassRole::Active), "open");
    }
}
