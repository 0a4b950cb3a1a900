//! Detection of in-band error markers
//!
//! A marker can be split across two chunks, so besides the fresh chunk the
//! scanner also looks at a window of the accumulated text that straddles
//! the chunk boundary.

/// Finds configured error markers in streamed text
#[derive(Debug, Clone)]
pub struct SentinelScanner {
    sentinels: Vec<String>,
    scan_accumulated: bool,
    longest: usize,
}

impl SentinelScanner {
    pub fn new(sentinels: Vec<String>, scan_accumulated: bool) -> Self {
        let sentinels: Vec<String> = sentinels.into_iter().filter(|s| !s.is_empty()).collect();
        let longest = sentinels.iter().map(|s| s.len()).max().unwrap_or(0);
        Self {
            sentinels,
            scan_accumulated,
            longest,
        }
    }

    /// First marker contained in `text`
    pub fn find<'a>(&'a self, text: &str) -> Option<&'a str> {
        self.sentinels
            .iter()
            .find(|s| text.contains(s.as_str()))
            .map(String::as_str)
    }

    /// Check a chunk that was just appended to `accumulated`
    ///
    /// `accumulated` already ends with `chunk`.
    pub fn scan_chunk<'a>(&'a self, chunk: &str, accumulated: &str) -> Option<&'a str> {
        if let Some(hit) = self.find(chunk) {
            return Some(hit);
        }
        if !self.scan_accumulated || self.longest == 0 {
            return None;
        }

        let tail_len = chunk.len() + self.longest - 1;
        let start = floor_char_boundary(accumulated, accumulated.len().saturating_sub(tail_len));
        self.find(&accumulated[start..])
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner(scan_accumulated: bool) -> SentinelScanner {
        SentinelScanner::new(
            vec!["[API Error".to_string(), "[Network Error".to_string()],
            scan_accumulated,
        )
    }

    #[test]
    fn test_finds_marker_in_chunk() {
        let scanner = scanner(false);
        assert_eq!(
            scanner.scan_chunk("\n[API Error: 500 - boom]", "正文\n[API Error: 500 - boom]"),
            Some("[API Error")
        );
        assert_eq!(scanner.scan_chunk("正文", "正文"), None);
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut accumulated = String::from("内容[Netw");
        accumulated.push_str("ork Error: reset]");

        assert_eq!(
            scanner(true).scan_chunk("ork Error: reset]", &accumulated),
            Some("[Network Error")
        );
        assert_eq!(scanner(false).scan_chunk("ork Error: reset]", &accumulated), None);
    }

    #[test]
    fn test_tail_window_respects_char_boundaries() {
        let accumulated = "中文中文中文中文中文中文中文中文x";
        assert_eq!(scanner(true).scan_chunk("x", accumulated), None);
    }
}
