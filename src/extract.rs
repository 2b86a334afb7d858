//! Model-keyed extraction of configuration fragments.
//!
//! A retrieved `<data>` document is a list of sibling top-level blocks, one
//! per YANG model, each opened by an element that declares its namespace.
//! Instead of parsing XML, the extractor relies on the one-tag-per-line
//! layout produced by [`crate::xml::data_document`]: the indentation in
//! front of the first line is the governing tag depth, and a line at that
//! depth carrying `xmlns=` opens a new model block.
//!
//! The opening line itself is the model key. It is used verbatim and never
//! parsed into a structured name.

use indexmap::IndexMap;

use crate::error::VerifyError;

/// Marker a line must carry to open a model block.
const NAMESPACE_MARKER: &str = "xmlns=";

/// NETCONF base:1.0 end-of-message delimiter.
const EOM_DELIMITER: &str = "]]>]]>";

/// One line of device-returned configuration text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigLine<'a> {
    raw: &'a str,
}

impl<'a> ConfigLine<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// Substring preceding the first `<`, or the whole line if it has none.
    pub fn tag_depth(&self) -> &'a str {
        match self.raw.find('<') {
            Some(pos) => &self.raw[..pos],
            None => self.raw,
        }
    }

    /// True if the line sits at `depth` and declares a default namespace.
    pub fn opens_model(&self, depth: &str) -> bool {
        self.tag_depth() == depth && self.raw.contains(NAMESPACE_MARKER)
    }

    /// Empty lines and protocol framing lines carry no configuration.
    pub fn is_ignorable(&self) -> bool {
        let trimmed = self.raw.trim();
        trimmed.is_empty() || trimmed == EOM_DELIMITER || trimmed.starts_with('#')
    }
}

/// Ordered mapping from model key to fragment text for one snapshot.
///
/// Keys keep first-seen order. The value of a key starts with the key
/// line itself and accumulates every following line of the block,
/// newline-joined, including nested sub-blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelKeyedConfig {
    fragments: IndexMap<String, String>,
}

impl ModelKeyedConfig {
    /// Extracts the model blocks from a normalised `<data>` document.
    ///
    /// The first and last lines (the `<data>` wrapper) are skipped.
    pub fn from_data_document(document: &str) -> Result<Self, VerifyError> {
        let lines = document.lines().collect::<Vec<_>>();
        if lines.len() < 3 {
            return Ok(Self::default());
        }
        extract(&lines[1..lines.len() - 1])
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fragments.get(key).map(|v| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fragments.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fragments.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ModelKeyedConfig
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fragments: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Builds the model-keyed mapping for a range of configuration lines.
///
/// A non-ignorable line that shows up before any model key exists is a
/// malformed document and fails the extraction instead of being dropped.
/// When a key line repeats, the later block replaces the earlier one.
pub fn extract<S: AsRef<str>>(lines: &[S]) -> Result<ModelKeyedConfig, VerifyError> {
    let mut fragments: IndexMap<String, String> = IndexMap::new();
    let Some(first) = lines.first() else {
        return Ok(ModelKeyedConfig { fragments });
    };
    let depth = ConfigLine::new(first.as_ref()).tag_depth();
    let mut current: Option<usize> = None;

    for (idx, raw) in lines.iter().enumerate() {
        let line = ConfigLine::new(raw.as_ref());
        if line.opens_model(depth) {
            // A repeated key line keeps its position; its block restarts.
            let (index, _) = fragments.insert_full(line.raw().to_string(), line.raw().to_string());
            current = Some(index);
            continue;
        }
        if line.is_ignorable() {
            continue;
        }
        match current.and_then(|i| fragments.get_index_mut(i)) {
            Some((_, fragment)) => {
                fragment.push('\n');
                fragment.push_str(line.raw());
            }
            None => {
                return Err(VerifyError::MalformedResponse(format!(
                    "line {idx} '{}' appears before any namespace-qualified block",
                    line.raw().trim()
                )));
            }
        }
    }

    Ok(ModelKeyedConfig { fragments })
}
