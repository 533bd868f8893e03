//! CommonMeta: the metadata convention for Krist transactions.
//!
//! ```text
//! key1=value1;key2=value2
//! name.kst;key1=value1
//! metaname@name.kst;key1=value1
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static NAME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([a-z0-9_-]{1,32})@)?([a-z0-9]{1,64})\.kst").expect("valid regex")
});

/// A `[metaname@]name.kst` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KristName {
    pub metaname: Option<String>,
    pub name: String,
}

impl KristName {
    /// Parses a name reference at the start of `text`, returning it and the
    /// rest of the text.
    pub fn parse_prefix(text: &str) -> Option<(Self, &str)> {
        let caps = NAME_PREFIX.captures(text)?;
        let whole = caps.get(0)?;
        let name = Self {
            metaname: caps.get(1).map(|m| m.as_str().to_string()),
            name: caps.get(2)?.as_str().to_string(),
        };
        Some((name, &text[whole.end()..]))
    }
}

impl std::fmt::Display for KristName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.metaname {
            Some(metaname) => write!(f, "{metaname}@{}.kst", self.name),
            None => write!(f, "{}.kst", self.name),
        }
    }
}

/// Parsed transaction metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonMeta {
    /// The name the transaction was sent to, if any.
    pub recipient: Option<KristName>,
    /// `key=value` entries.
    pub entries: BTreeMap<String, String>,
}

impl CommonMeta {
    /// Parses metadata. `None` parses as empty.
    ///
    /// Segments without `=` are skipped. A name reference that is not
    /// followed by `;` ends parsing.
    pub fn parse(meta: Option<&str>) -> Self {
        let Some(mut rest) = meta else {
            return Self::default();
        };

        let mut parsed = Self::default();
        if let Some((name, after)) = KristName::parse_prefix(rest) {
            parsed.recipient = Some(name);
            match after.strip_prefix(';') {
                Some(data) => rest = data,
                None => return parsed,
            }
        }

        for segment in rest.split(';') {
            if let Some((key, value)) = segment.split_once('=') {
                parsed.entries.insert(key.to_string(), value.to_string());
            }
        }
        parsed
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_entries() {
        let meta = CommonMeta::parse(Some("kauth=1;return=bob@switchcraft.kst"));
        assert_eq!(meta.recipient, None);
        assert_eq!(meta.get("kauth"), Some("1"));
        assert_eq!(meta.get("return"), Some("bob@switchcraft.kst"));
    }

    #[test]
    fn test_name_prefix() {
        let meta = CommonMeta::parse(Some("shop@example.kst;kauth=yes"));
        assert_eq!(
            meta.recipient,
            Some(KristName {
                metaname: Some("shop".into()),
                name: "example".into(),
            })
        );
        assert!(meta.contains("kauth"));

        let bare = CommonMeta::parse(Some("example.kst"));
        assert_eq!(bare.recipient.unwrap().to_string(), "example.kst");
        assert!(bare.entries.is_empty());

        let trailing = CommonMeta::parse(Some("example.kstkauth=1"));
        assert!(trailing.entries.is_empty());
    }

    #[test]
    fn test_lenient_segments() {
        let meta = CommonMeta::parse(Some(
            "message=Security error: no; try again;kauth_for=42;;",
        ));
        assert_eq!(meta.get("message"), Some("Security error: no"));
        assert_eq!(meta.get("kauth_for"), Some("42"));
        assert_eq!(meta.entries.len(), 2);
        assert_eq!(CommonMeta::parse(None), CommonMeta::default());
    }
}
