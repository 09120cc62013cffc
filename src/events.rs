//! Observability interface (§6): consumed, not produced, by the core. The
//! engine reports progress and failures through a single `EventListener`
//! rather than owning a logging dependency — the same pattern the teacher's
//! wasm facade uses to surface engine errors to its JS caller
//! (`crates/bitcraft-wasm/src/convert.rs::error_to_js`), generalized here
//! into a proper fan-out interface instead of a one-shot error mapper.

/// Notified of template/codec lifecycle and per-field progress. All methods
/// have no-op default bodies; implement only the ones a host cares about.
pub trait EventListener: Send + Sync {
    fn codec_loading(&self, _kind: &str) {}
    fn codec_loaded(&self, _kind: &str) {}
    fn codec_load_failed(&self, _kind: &str, _reason: &str) {}

    fn template_loading(&self, _type_name: &str) {}
    fn template_loaded(&self, _type_name: &str) {}
    fn template_load_failed(&self, _type_name: &str, _reason: &str) {}

    fn configuration_loading(&self, _type_name: &str) {}
    fn configuration_loaded(&self, _type_name: &str) {}
    fn configuration_load_failed(&self, _type_name: &str, _reason: &str) {}

    fn field_reading(&self, _template: &str, _field: &str) {}
    fn field_read(&self, _template: &str, _field: &str) {}
    fn field_written(&self, _template: &str, _field: &str) {}
    fn field_evaluated(&self, _template: &str, _field: &str) {}
    fn field_failed(&self, _template: &str, _field: &str, _reason: &str) {}
}

/// Default listener that discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventListener;

impl EventListener for NullEventListener {}
