//! Copy-on-write message headers.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Header map carried by every [`crate::Message`].
///
/// Clones share storage until one side writes; a write detaches the writer,
/// so a reply built from a cloned inbound message never touches the original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Arc<BTreeMap<String, String>>);

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns true if the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Sets a header, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        Arc::make_mut(&mut self.0).insert(name.into(), value.into());
    }

    /// Removes a header, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        if !self.0.contains_key(name) {
            return None;
        }
        Arc::make_mut(&mut self.0).remove(name)
    }

    /// Copies every header of `other` into this map.
    pub fn extend(&mut self, other: &Headers) {
        if other.is_empty() {
            return;
        }
        let map = Arc::make_mut(&mut self.0);
        for (name, value) in other.iter() {
            map.insert(name.to_string(), value.to_string());
        }
    }

    /// Iterates over headers in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(Arc::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }
}

impl std::fmt::Display for Headers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_detached_on_write() {
        let original: Headers = [("id", "1")].into_iter().collect();
        let mut copy = original.clone();

        copy.insert("id", "2");
        copy.insert("destination", "orders");

        assert_eq!(original.get("id"), Some("1"));
        assert!(!original.contains("destination"));
        assert_eq!(copy.get("id"), Some("2"));
    }

    #[test]
    fn extend_overwrites_existing_values() {
        let mut headers: Headers = [("a", "1"), ("b", "2")].into_iter().collect();
        let extra: Headers = [("b", "3"), ("c", "4")].into_iter().collect();

        headers.extend(&extra);

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("b"), Some("3"));
        assert_eq!(headers.get("c"), Some("4"));
    }

    #[test]
    fn remove_missing_header_is_none() {
        let mut headers = Headers::new();
        assert_eq!(headers.remove("id"), None);
        assert!(headers.is_empty());
    }

    #[test]
    fn display_lists_headers_in_name_order() {
        let headers: Headers = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(headers.to_string(), "{a=1, b=2}");
    }
}
