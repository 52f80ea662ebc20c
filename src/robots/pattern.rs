/// A robots.txt path pattern
///
/// Matching is anchored at the start of the path. `*` matches any run of
/// characters (including none) and a trailing `$` requires the pattern to
/// consume the whole path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    parts: Vec<String>,
    anchored_end: bool,
}

impl PathPattern {
    pub fn new(raw: &str) -> Self {
        let (body, anchored_end) = match raw.strip_suffix('$') {
            Some(body) => (body, true),
            None => (raw, false),
        };

        Self {
            raw: raw.to_string(),
            parts: body.split('*').map(str::to_string).collect(),
            anchored_end,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Checks whether `path` (path plus optional `?query`) matches
    pub fn matches(&self, path: &str) -> bool {
        let Some((first, rest)) = self.parts.split_first() else {
            return true;
        };

        if !path.starts_with(first.as_str()) {
            return false;
        }
        let mut pos = first.len();

        for (i, part) in rest.iter().enumerate() {
            let is_last = i + 1 == rest.len();

            // The final literal of an anchored pattern must sit at the very end,
            // not at its first occurrence
            if is_last && self.anchored_end {
                return path.len() >= pos + part.len() && path[pos..].ends_with(part.as_str());
            }

            match path[pos..].find(part.as_str()) {
                Some(offset) => pos += offset + part.len(),
                None => return false,
            }
        }

        !self.anchored_end || pos == path.len()
    }
}
