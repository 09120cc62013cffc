//! Template registry and resync scanner (component G, §5).
//!
//! Templates are keyed by the hex encoding of their header's start bytes
//! (§5 "templates are keyed by hex of header-start bytes"); lookup tries
//! longer keys before shorter ones so a more specific header always wins
//! over a shorter prefix of it, then falls back to lexicographic order for
//! same-length keys to make matching deterministic. After a decode error
//! the dispatcher asks [`TemplateRegistry::find_next_message_index`] to
//! locate the next plausible message start via a BNDM (Backward
//! Nondeterministic DAWG Matching) bit-parallel scan over every registered
//! header, the same technique used to resynchronize a byte stream after a
//! corrupt/unexpected frame.

use std::collections::HashMap;

use crate::errors::TemplateError;
use crate::template::Template;

/// Templates indexed by the hex of their header bytes, with lookup keys
/// pre-sorted longest-first for "most specific header wins" matching.
pub struct TemplateRegistry {
    by_type_name: HashMap<String, Template>,
    /// `(hex_key, type_name)` pairs, sorted longest-key-first then
    /// lexicographically, for header matching against a live stream.
    ordered_keys: Vec<(String, String)>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        TemplateRegistry { by_type_name: HashMap::new(), ordered_keys: Vec::new() }
    }

    /// Registers `template`, keyed by the hex of its header bytes. Returns
    /// [`TemplateError::Collision`] if another template already claims the
    /// same header key.
    pub fn register(&mut self, template: Template) -> Result<(), TemplateError> {
        let key = hex_key(&template.header.start_bytes);
        if self.ordered_keys.iter().any(|(existing_key, _)| *existing_key == key) {
            return Err(TemplateError::Collision(key));
        }
        self.ordered_keys.push((key, template.type_name.clone()));
        self.ordered_keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        self.by_type_name.insert(template.type_name.clone(), template);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Result<&Template, TemplateError> {
        self.by_type_name.get(type_name).ok_or_else(|| TemplateError::NotATemplate(type_name.to_string()))
    }

    /// Returns the template whose header matches the bytes at the current
    /// stream position, trying longer headers first so a template is never
    /// shadowed by a shorter one that happens to be a prefix of it.
    pub fn find_matching(&self, bytes: &[u8]) -> Result<&Template, TemplateError> {
        for (_, type_name) in &self.ordered_keys {
            let template = &self.by_type_name[type_name];
            let header = &template.header.start_bytes;
            if bytes.len() >= header.len() && &bytes[..header.len()] == header.as_slice() {
                return Ok(template);
            }
        }
        Err(TemplateError::NoTemplate)
    }

    pub fn len(&self) -> usize {
        self.by_type_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type_name.is_empty()
    }

    /// Scans `bytes` starting at `from` for the earliest position at which
    /// any registered header could plausibly start, using BNDM over the
    /// set of headers. Returns `None` if no header appears again.
    pub fn find_next_message_index(&self, bytes: &[u8], from: usize) -> Option<usize> {
        let patterns: Vec<&[u8]> = self.ordered_keys.iter().map(|(_, name)| self.by_type_name[name].header.start_bytes.as_slice()).collect();
        bndm_find_any(bytes, from, &patterns)
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_key(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Finds the earliest offset `>= from` at which any of `patterns` occurs in
/// `haystack`, scanning each pattern with BNDM and taking the minimum
/// match position across all of them. `O(patterns.len() * haystack.len())`
/// — acceptable given header sets are small (dozens, not thousands).
fn bndm_find_any(haystack: &[u8], from: usize, patterns: &[&[u8]]) -> Option<usize> {
    patterns
        .iter()
        .filter(|p| !p.is_empty() && p.len() <= 64)
        .filter_map(|pattern| bndm_find(haystack, from, pattern))
        .min()
}

/// BNDM search for a single pattern, returning the earliest match position
/// at or after `from`.
fn bndm_find(haystack: &[u8], from: usize, pattern: &[u8]) -> Option<usize> {
    let m = pattern.len();
    if m == 0 || m > 64 || from + m > haystack.len() {
        return None;
    }

    let mut masks = [0u64; 256];
    for (i, &byte) in pattern.iter().enumerate() {
        masks[byte as usize] |= 1u64 << (m - 1 - i);
    }

    let mut window_start = from;
    while window_start + m <= haystack.len() {
        let mut state: u64 = (1u64 << m) - 1;
        let mut last_prefix_len = 0usize;
        let mut j = m;

        while state != 0 {
            j -= 1;
            state &= masks[haystack[window_start + j] as usize];
            if state & (1u64 << (m - 1)) != 0 {
                if j == 0 {
                    return Some(window_start);
                }
                last_prefix_len = j;
            }
            if j == 0 {
                break;
            }
            state <<= 1;
        }

        window_start += if last_prefix_len > 0 { m - last_prefix_len } else { 1 };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingSpec;
    use crate::bits::ByteOrder;
    use crate::field::{BoundFieldSpec, HeaderSpec, SchemaEntry};

    fn template(type_name: &str, header: &[u8]) -> Template {
        let entries = vec![SchemaEntry::Bound(BoundFieldSpec {
            field_name: "payload".into(),
            skip_before: vec![],
            condition: None,
            binding: BindingSpec::Byte { unsigned: true },
            validator: None,
            converter: None,
        })];
        Template::compile(type_name, HeaderSpec::new(header.to_vec()), entries).unwrap()
    }

    #[test]
    fn registers_and_looks_up_by_type_name() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("Ping", &[0xAA])).unwrap();
        assert!(registry.get("Ping").is_ok());
        assert!(registry.get("Missing").is_err());
    }

    #[test]
    fn rejects_duplicate_header_keys() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("Ping", &[0xAA])).unwrap();
        let err = registry.register(template("Pong", &[0xAA]));
        assert!(matches!(err, Err(TemplateError::Collision(_))));
    }

    #[test]
    fn longer_header_takes_precedence_over_shorter_prefix() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("Short", &[0xAA])).unwrap();
        registry.register(template("Long", &[0xAA, 0xBB])).unwrap();

        let matched = registry.find_matching(&[0xAA, 0xBB, 0x01]).unwrap();
        assert_eq!(matched.type_name, "Long");

        let matched_short = registry.find_matching(&[0xAA, 0xCC]).unwrap();
        assert_eq!(matched_short.type_name, "Short");
    }

    #[test]
    fn find_next_message_index_locates_header_after_corrupt_bytes() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("Ping", &[0xAA, 0xBB])).unwrap();

        let stream = [0x00, 0x01, 0x02, 0xAA, 0xBB, 0x99];
        let index = registry.find_next_message_index(&stream, 0);
        assert_eq!(index, Some(3));
    }

    #[test]
    fn find_next_message_index_returns_none_when_absent() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("Ping", &[0xAA, 0xBB])).unwrap();

        let stream = [0x00, 0x01, 0x02];
        assert_eq!(registry.find_next_message_index(&stream, 0), None);
    }

    #[test]
    fn find_next_message_index_respects_from_offset() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("Ping", &[0xAA])).unwrap();

        let stream = [0xAA, 0x00, 0xAA, 0x00];
        assert_eq!(registry.find_next_message_index(&stream, 1), Some(2));
    }
}
