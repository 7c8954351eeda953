use serde::{Deserialize, Serialize};

pub const TAG_DELIMITER: char = ',';

pub const EMOTION_VOCABULARY: [&str; 10] = [
    "기쁨",
    "슬픔",
    "분노",
    "불안",
    "놀람",
    "혐오",
    "평온함",
    "만족",
    "후회",
    "설렘",
];

/// Ordered emotion keywords. Duplicates from the vendor are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionTagSet(Vec<String>);

impl EmotionTagSet {
    /// Keeps only Hangul syllables and the delimiter, character by character,
    /// then splits and drops empty entries.
    pub fn from_completion(raw: &str) -> Self {
        let filtered: String = raw.chars().filter(|c| is_tag_char(*c)).collect();
        filtered
            .split(TAG_DELIMITER)
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl FromIterator<String> for EmotionTagSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn is_tag_char(c: char) -> bool {
    ('가'..='힣').contains(&c) || c == TAG_DELIMITER
}
