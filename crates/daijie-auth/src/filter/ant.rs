//! Ant-style path patterns.
//!
//! | pattern | matches |
//! |---------|---------|
//! | `?` | one character within a segment |
//! | `*` | zero or more characters within a segment |
//! | `**` | zero or more whole segments |
//!
//! A pattern and a path must agree on whether they start with `/`, so
//! `/api/**` matches `/api/users` but `*/**` matches no absolute path.

const SEPARATOR: char = '/';

/// Matches request paths against Ant-style patterns.
#[derive(Debug, Default, Clone, Copy)]
pub struct AntPathMatcher;

impl AntPathMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Whether `path` matches `pattern` in full.
    ///
    /// A trailing `/` on either side is ignored unless it is the whole string.
    pub fn matches(&self, pattern: &str, path: &str) -> bool {
        let pattern = strip_trailing_separator(pattern.trim());
        let path = strip_trailing_separator(path);

        if pattern.starts_with(SEPARATOR) != path.starts_with(SEPARATOR) {
            return false;
        }

        let pattern_segments = segments(pattern);
        let path_segments = segments(path);
        match_segments(&pattern_segments, &path_segments)
    }

    /// Whether `pattern` contains wildcards.
    pub fn is_pattern(&self, pattern: &str) -> bool {
        pattern.contains('*') || pattern.contains('?')
    }
}

fn strip_trailing_separator(s: &str) -> &str {
    if s.len() > 1 {
        s.strip_suffix(SEPARATOR).unwrap_or(s)
    } else {
        s
    }
}

fn segments(s: &str) -> Vec<&str> {
    s.split(SEPARATOR)
        .map(str::trim)
        .filter(|seg| !seg.is_empty())
        .collect()
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            // Collapse runs of `**`
            if rest.first() == Some(&"**") {
                return match_segments(rest, path);
            }
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((head, rest)) => match path.split_first() {
            Some((segment, path_rest)) => {
                match_segment(head, segment) && match_segments(rest, path_rest)
            }
            None => false,
        },
    }
}

/// `*` and `?` matching within a single segment.
fn match_segment(pattern: &str, segment: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = segment.chars().collect();

    let (mut pi, mut si) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_si = 0;

    while si < s.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == s[si]) {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_si = si;
            pi += 1;
        } else if let Some(star_pi) = star {
            pi = star_pi + 1;
            star_si += 1;
            si = star_si;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        AntPathMatcher::new().matches(pattern, path)
    }

    #[test]
    fn test_literal_paths() {
        assert!(matches("/login", "/login"));
        assert!(matches("/login", "/login/"));
        assert!(!matches("/login", "/logout"));
        assert!(matches("/", "/"));
        assert!(!matches("/", "/x"));
    }

    #[test]
    fn test_single_segment_wildcards() {
        assert!(matches("/api/*", "/api/users"));
        assert!(!matches("/api/*", "/api/users/1"));
        assert!(matches("/*.html", "/index.html"));
        assert!(matches("/user?", "/user1"));
        assert!(!matches("/user?", "/user12"));
        assert!(matches("/a*b*c", "/aXXbYYc"));
        assert!(!matches("/a*b*c", "/aXXbYY"));
    }

    #[test]
    fn test_double_star() {
        assert!(matches("/**", "/"));
        assert!(matches("/**", "/a/b/c"));
        assert!(matches("/api/**", "/api"));
        assert!(matches("/api/**", "/api/v1/users"));
        assert!(matches("/**/admin/**", "/x/y/admin/z"));
        assert!(matches("/**/*.css", "/static/css/site.css"));
        assert!(!matches("/**/*.css", "/static/site.js"));
        assert!(matches("/a/**/**/b", "/a/b"));
    }

    #[test]
    fn test_leading_separator_must_agree() {
        assert!(!matches("*/**", "/anything"));
        assert!(!matches("*/**", "/"));
        assert!(matches("*/**", "app/x"));
        assert!(!matches("/api/**", "api/x"));
    }

    #[test]
    fn test_is_pattern() {
        let matcher = AntPathMatcher::new();
        assert!(matcher.is_pattern("/api/**"));
        assert!(matcher.is_pattern("/user?"));
        assert!(!matcher.is_pattern("/login"));
    }
}
