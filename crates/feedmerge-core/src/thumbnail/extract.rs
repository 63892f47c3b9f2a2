use std::sync::OnceLock;

use regex::Regex;

fn img_src_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<img\b[^>]*?\ssrc\s*=\s*["']([^"']+)["']"#).ok())
        .as_ref()
}

fn og_image_regexes() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r#"(?is)<meta\b[^>]*?\sproperty\s*=\s*["']og:image["'][^>]*?\scontent\s*=\s*["']([^"']+)["']"#,
            // Reversed attribute order
            r#"(?is)<meta\b[^>]*?\scontent\s*=\s*["']([^"']+)["'][^>]*?\sproperty\s*=\s*["']og:image["']"#,
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Source of the first `<img>` tag in an HTML fragment
pub fn first_img_src(html: &str) -> Option<String> {
    img_src_regex()?
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|src| !src.is_empty())
}

/// Value of the page's `og:image` meta tag, if one can be found.
///
/// This is a plain pattern scan over the markup, not an HTML parse; unusual
/// attribute layouts are missed.
pub fn og_image(html: &str) -> Option<String> {
    og_image_regexes()
        .iter()
        .find_map(|re| re.captures(html).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_img_src() {
        assert_eq!(
            first_img_src(r#"<p>Hi</p><img src="https://a/1.jpg"><img src="https://a/2.jpg">"#)
                .as_deref(),
            Some("https://a/1.jpg")
        );
        assert_eq!(
            first_img_src(r#"<IMG class='x' SRC='https://a/single.png' />"#).as_deref(),
            Some("https://a/single.png")
        );
        assert_eq!(
            first_img_src("<img\n  width=\"10\"\n  src=\"https://a/multi.gif\">").as_deref(),
            Some("https://a/multi.gif")
        );
    }

    #[test]
    fn test_first_img_src_ignores_data_src_and_missing() {
        assert_eq!(first_img_src("<p>no image</p>"), None);
        assert_eq!(first_img_src(r#"<img data-src="https://a/lazy.jpg">"#), None);
        assert_eq!(first_img_src(r#"<img src="">"#), None);
    }

    #[test]
    fn test_og_image() {
        let page = r#"<html><head>
<meta property="og:title" content="Title">
<meta property="og:image" content="https://a/og.jpg">
</head></html>"#;
        assert_eq!(og_image(page).as_deref(), Some("https://a/og.jpg"));
    }

    #[test]
    fn test_og_image_reversed_attributes() {
        let page = r#"<meta content='https://a/rev.jpg' property='og:image'/>"#;
        assert_eq!(og_image(page).as_deref(), Some("https://a/rev.jpg"));
    }

    #[test]
    fn test_og_image_absent() {
        assert_eq!(og_image(r#"<meta name="twitter:image" content="https://a/t.jpg">"#), None);
        assert_eq!(og_image(""), None);
    }
}
