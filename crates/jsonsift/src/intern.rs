//! Bounded intern table for short strings.
//!
//! Object keys repeat heavily in array-of-record inputs; resolving them
//! through a small cache makes the steady-state token loop allocation-free
//! for every repeated key and short value. Strings of
//! [`MAX_INTERN_LEN`] bytes or more decode without caching, and once the
//! table holds [`MAX_INTERN_ENTRIES`] entries new strings stop being
//! admitted (the table never evicts).

use std::collections::HashMap;
use std::rc::Rc;

/// Strings shorter than this are candidates for interning.
const MAX_INTERN_LEN: usize = 32;

/// Upper bound on cached entries.
const MAX_INTERN_ENTRIES: usize = 500;

#[derive(Debug, Default)]
pub(crate) struct InternTable {
    map: HashMap<Box<[u8]>, Rc<str>>,
}

impl InternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `bytes` as UTF-8 text, returning the cached string on a hit.
    ///
    /// Invalid UTF-8 decodes lossily; the tokenizer is permissive and the
    /// stream contract promises UTF-8 input.
    pub fn resolve(&mut self, bytes: &[u8]) -> Rc<str> {
        if bytes.len() >= MAX_INTERN_LEN {
            return decode(bytes);
        }
        if let Some(hit) = self.map.get(bytes) {
            return Rc::clone(hit);
        }
        let text = decode(bytes);
        if self.map.len() < MAX_INTERN_ENTRIES {
            self.map.insert(bytes.into(), Rc::clone(&text));
        }
        text
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

fn decode(bytes: &[u8]) -> Rc<str> {
    match String::from_utf8_lossy(bytes) {
        std::borrow::Cow::Borrowed(s) => Rc::from(s),
        std::borrow::Cow::Owned(s) => Rc::from(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_same_allocation() {
        let mut table = InternTable::new();
        let a = table.resolve(b"name");
        let b = table.resolve(b"name");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn long_strings_bypass_cache() {
        let mut table = InternTable::new();
        let long = [b'x'; MAX_INTERN_LEN];
        let a = table.resolve(&long);
        let b = table.resolve(&long);
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn admission_stops_at_cap() {
        let mut table = InternTable::new();
        for i in 0..(MAX_INTERN_ENTRIES + 50) {
            table.resolve(format!("k{i}").as_bytes());
        }
        assert_eq!(table.len(), MAX_INTERN_ENTRIES);
        // Existing entries still hit.
        let a = table.resolve(b"k0");
        let b = table.resolve(b"k0");
        assert!(Rc::ptr_eq(&a, &b));
    }
}
