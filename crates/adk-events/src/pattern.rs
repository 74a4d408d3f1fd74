use std::fmt;
use std::str::FromStr;

/// A dot-segmented subscription pattern. `*` matches exactly one segment,
/// and a bare `*` pattern matches every kind regardless of depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindPattern {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

impl KindPattern {
    pub fn matches(&self, kind: &str) -> bool {
        if self.raw == "*" {
            return true;
        }
        let parts: Vec<&str> = kind.split('.').collect();
        if parts.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(parts)
            .all(|(segment, part)| match segment {
                Segment::Any => true,
                Segment::Literal(literal) => literal == part,
            })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for KindPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for KindPattern {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err("empty kind pattern".to_string());
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(format!("empty segment in kind pattern: {raw}"));
            }
            if part == "*" {
                segments.push(Segment::Any);
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

pub fn matches_any(patterns: &[KindPattern], kind: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|pattern| pattern.matches(kind))
}

/// Comma-joined wire representation used by subscribe and replay filters.
pub fn join_patterns(patterns: &[KindPattern]) -> String {
    patterns
        .iter()
        .map(KindPattern::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_patterns(joined: &str) -> Result<Vec<KindPattern>, String> {
    joined
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(KindPattern::from_str)
        .collect()
}
