//! Web worker entry point for keyout background removal.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It receives image file bytes and `EditorSettings` JSON via
//! `postMessage`, runs the removal pipeline, and posts the result back.
//!
//! Rasters (processed and preview) are sent as raw `Uint8Array` RGBA
//! buffers to avoid JSON-encoding megabytes of pixel data. Warnings and
//! diagnostics are small JSON strings.
//!
//! Running the pipeline in a worker keeps the browser's main thread
//! free for UI updates while large images are keyed.

use keyout_engine::{EditorSettings, EngineError, PipelineOutput, RgbaImage, ScanLimits};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// A finished request, ready to post.
struct Reply {
    output: PipelineOutput,
    preview: RgbaImage,
}

/// Decode, validate, process, and render the preview.
fn run_request(image_bytes: &[u8], settings_json: &str) -> Result<Reply, EngineError> {
    let settings: EditorSettings = serde_json::from_str(settings_json)
        .map_err(|e| EngineError::InvalidSettings(format!("failed to parse settings: {e}")))?;
    let output = keyout_engine::process(image_bytes, &settings)?;
    let preview = keyout_engine::render_preview(&output.image, &settings, ScanLimits::default())?;
    Ok(Reply { output, preview })
}

/// Message protocol: the main thread sends a JS object with:
/// - `imageBytes`: `Uint8Array` containing the raw image file bytes
/// - `settingsJson`: `String` containing JSON-serialized `EditorSettings`
/// - `generation`: `f64` generation counter (passed through to response)
///
/// On success the worker responds with a JS object containing:
/// - `generation`: `f64` matching the request generation
/// - `ok`: `true`
/// - `width`, `height`: `f64` raster dimensions
/// - `pixels`: `Uint8Array` processed RGBA pixels, no effects applied
/// - `previewPixels`: `Uint8Array` RGBA pixels with display effects
/// - `warningsJson`: `String` JSON array of `PipelineWarning`
/// - `diagnosticsJson`: `String` JSON `PipelineDiagnostics`
///
/// On error the worker responds with:
/// - `generation`: `f64`
/// - `ok`: `false`
/// - `errorJson`: `String` JSON-serialized `EngineError`
///
/// A newer generation supersedes older ones; the main thread drops
/// replies whose generation is stale.
///
/// # Worker entry point
///
/// Called automatically when the WASM module is instantiated in the
/// worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();

    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope");

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(&event);
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // lives for the worker lifetime
}

fn field(data: &JsValue, name: &str) -> Result<JsValue, EngineError> {
    js_sys::Reflect::get(data, &JsValue::from_str(name))
        .ok()
        .filter(|v| !v.is_undefined())
        .ok_or_else(|| EngineError::InvalidSettings(format!("message is missing {name}")))
}

/// Handle an incoming message from the main thread.
fn handle_message(event: &web_sys::MessageEvent) {
    let data = event.data();
    let generation = field(&data, "generation")
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(f64::NAN);

    let request = field(&data, "imageBytes").and_then(|bytes| {
        let bytes: js_sys::Uint8Array = bytes
            .dyn_into()
            .map_err(|_| EngineError::InvalidSettings("imageBytes is not a Uint8Array".into()))?;
        let settings_json = field(&data, "settingsJson")?
            .as_string()
            .ok_or_else(|| EngineError::InvalidSettings("settingsJson is not a string".into()))?;
        Ok((bytes.to_vec(), settings_json))
    });

    // Synchronous: blocks this worker thread only.
    match request.and_then(|(bytes, json)| run_request(&bytes, &json)) {
        Ok(reply) => post_success_response(generation, &reply),
        Err(e) => post_error(generation, &e),
    }
}

/// Post a processed raster back to the main thread.
fn post_success_response(generation: f64, reply: &Reply) {
    let output = &reply.output;
    let (warnings_json, diagnostics_json) = match (
        serde_json::to_string(&output.warnings),
        serde_json::to_string(&output.diagnostics),
    ) {
        (Ok(w), Ok(d)) => (w, d),
        (Err(e), _) | (_, Err(e)) => {
            post_error(
                generation,
                &EngineError::InvalidSettings(format!("failed to serialize result: {e}")),
            );
            return;
        }
    };

    let response = js_sys::Object::new();
    let set = |key: &str, val: &JsValue| {
        js_sys::Reflect::set(&response, &JsValue::from_str(key), val)
            .expect_throw("failed to set response field");
    };

    set("generation", &JsValue::from_f64(generation));
    set("ok", &JsValue::from_bool(true));
    set("width", &JsValue::from_f64(f64::from(output.image.width())));
    set("height", &JsValue::from_f64(f64::from(output.image.height())));
    set("pixels", &js_sys::Uint8Array::from(output.image.as_raw().as_slice()));
    set(
        "previewPixels",
        &js_sys::Uint8Array::from(reply.preview.as_raw().as_slice()),
    );
    set("warningsJson", &JsValue::from_str(&warnings_json));
    set("diagnosticsJson", &JsValue::from_str(&diagnostics_json));

    post(&response);
}

/// Post an error response back to the main thread.
fn post_error(generation: f64, error: &EngineError) {
    let error_json = serde_json::to_string(error)
        .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""));
    let response = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&response, &JsValue::from_str("generation"), &JsValue::from_f64(generation));
    let _ = js_sys::Reflect::set(&response, &JsValue::from_str("ok"), &JsValue::from_bool(false));
    let _ = js_sys::Reflect::set(&response, &JsValue::from_str("errorJson"), &JsValue::from_str(&error_json));
    post(&response);
}

fn post(response: &js_sys::Object) {
    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        let _ = global.post_message(response);
    }
}
