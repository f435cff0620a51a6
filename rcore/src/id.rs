use std::fmt;

pub const SEGMENT_SEPARATOR: char = '.';

/// Identifies one block of a data format by its dotted path, for example
/// `ltvc.chunk.header.length`. The first segment names the top level block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    format: String,
    segments: Vec<String>,
}

impl BlockId {
    pub fn new(format: &str, global_id: &str) -> Self {
        BlockId {
            format: format.to_string(),
            segments: global_id
                .split(SEGMENT_SEPARATOR)
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn from_segments(format: &str, segments: Vec<String>) -> Self {
        BlockId {
            format: format.to_string(),
            segments,
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn global_id(&self) -> String {
        self.segments.join(".")
    }

    pub fn local_id(&self) -> &str {
        self.segments.last().map(|s| s.as_str()).unwrap_or("")
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn parent(&self) -> Option<BlockId> {
        if self.segments.len() <= 1 {
            return None;
        }

        Some(BlockId {
            format: self.format.clone(),
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, local_id: &str) -> BlockId {
        let mut segments = self.segments.clone();
        segments.push(local_id.to_string());

        BlockId {
            format: self.format.clone(),
            segments,
        }
    }

    /// Same path with the last segment swapped out, this is how a generic
    /// block becomes concrete once its id field was read.
    pub fn with_local_id(&self, local_id: &str) -> BlockId {
        self.with_segment(self.segments.len() - 1, local_id)
    }

    pub fn with_segment(&self, idx: usize, segment: &str) -> BlockId {
        let mut segments = self.segments.clone();
        if let Some(s) = segments.get_mut(idx) {
            *s = segment.to_string();
        }

        BlockId {
            format: self.format.clone(),
            segments,
        }
    }

    pub fn is_ancestor_of(&self, other: &BlockId) -> bool {
        self.format == other.format
            && self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.global_id())
    }
}
