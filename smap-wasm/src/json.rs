use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::JsValue;

/// Serialize through JSON text so the result is a plain JS object.
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> JsValue {
    match serde_json::to_string(value) {
        Ok(text) => js_sys::JSON::parse(&text).unwrap_or(JsValue::NULL),
        Err(e) => {
            log::error!("Smap: cannot serialize value for the engine: {e}");
            JsValue::NULL
        }
    }
}

/// Read a JS value as JSON. Functions and DOM nodes are dropped by
/// `JSON.stringify`; callers pull those out separately.
pub fn from_js<T: DeserializeOwned>(value: &JsValue) -> Result<T, String> {
    let text = js_sys::JSON::stringify(value)
        .ok()
        .and_then(|s| s.as_string())
        .ok_or_else(|| "value is not JSON serializable".to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

/// Like [`from_js`] but `undefined`/`null` yield the default.
pub fn from_js_or_default<T: DeserializeOwned + Default>(value: &JsValue) -> Result<T, String> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_js(value)
}
