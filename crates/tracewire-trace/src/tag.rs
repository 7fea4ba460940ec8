//! Well-known tag keys and the length policy for large string tags.

/// Key of a span tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagKey(&'static str);

impl TagKey {
    pub const URL: TagKey = TagKey("url");
    pub const HTTP_METHOD: TagKey = TagKey("http.method");
    pub const HTTP_STATUS_CODE: TagKey = TagKey("http.status_code");
    pub const HTTP_HEADERS: TagKey = TagKey("http.headers");
    pub const HTTP_BODY: TagKey = TagKey("http.body");
    pub const HTTP_PARAMS: TagKey = TagKey("http.params");

    pub const fn new(key: &'static str) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Configured length limit for one tag.
///
/// `0` omits the tag, a negative value keeps the full value and a positive
/// value keeps that many leading characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthThreshold(i32);

impl LengthThreshold {
    pub const UNLIMITED: LengthThreshold = LengthThreshold(-1);
    pub const DISABLED: LengthThreshold = LengthThreshold(0);

    pub fn new(threshold: i32) -> Self {
        Self(threshold)
    }

    pub fn is_disabled(&self) -> bool {
        self.0 == 0
    }

    /// Apply the policy, returning the text to record or `None` to omit it.
    pub fn apply<'a>(&self, value: &'a str) -> Option<&'a str> {
        match self.0 {
            0 => None,
            n if n < 0 => Some(value),
            n => {
                let limit = n as usize;
                match value.char_indices().nth(limit) {
                    Some((cut, _)) => Some(&value[..cut]),
                    None => Some(value),
                }
            }
        }
    }
}

impl From<i32> for LengthThreshold {
    fn from(threshold: i32) -> Self {
        Self(threshold)
    }
}
