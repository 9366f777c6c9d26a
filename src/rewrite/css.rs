//! Absolutizes `url(...)` references in stylesheets.
//!
//! Stylesheets fetched through the proxy live under the proxy's origin, so
//! any relative reference inside them would otherwise resolve against the
//! proxy instead of the site that wrote them. Every reference is rebuilt as
//! an absolute URL against the stylesheet's own fetch URL; the browser then
//! loads it straight from the origin, bypassing the proxy, which keeps pages
//! rendering even though those subresource fetches go uncontrolled.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static URL_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"url\(([^)]+)\)").unwrap());

pub fn rewrite(stylesheet: &str, fetch_url: &Url) -> String {
    URL_REF
        .replace_all(stylesheet, |caps: &regex::Captures| {
            let raw = caps[1].trim();
            let reference = raw.trim_matches(|c| c == '"' || c == '\'').trim();
            match absolutize(reference, fetch_url) {
                Some(absolute) => format!("url(\"{}\")", absolute),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Absolute form of one reference, or None when it should stay as written.
fn absolutize(reference: &str, fetch_url: &Url) -> Option<String> {
    if reference.is_empty()
        || reference.starts_with("data:")
        || reference.starts_with("http://")
        || reference.starts_with("https://")
    {
        return None;
    }
    if let Some(rest) = reference.strip_prefix("//") {
        return Some(format!("{}://{}", fetch_url.scheme(), rest));
    }
    if reference.starts_with('/') {
        return Some(format!(
            "{}{}",
            fetch_url.origin().ascii_serialization(),
            reference
        ));
    }
    fetch_url.join(reference).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet_url() -> Url {
        Url::parse("https://a.example/styles/main.css").unwrap()
    }

    #[test]
    fn test_root_relative_reference() {
        assert_eq!(
            rewrite("body { background: url(/img.png); }", &sheet_url()),
            "body { background: url(\"https://a.example/img.png\"); }"
        );
    }

    #[test]
    fn test_parent_relative_reference() {
        assert_eq!(
            rewrite(".a { background: url(../img.png); }", &sheet_url()),
            ".a { background: url(\"https://a.example/img.png\"); }"
        );
    }

    #[test]
    fn test_sibling_relative_reference() {
        assert_eq!(
            rewrite(".a { background: url(img.png); }", &sheet_url()),
            ".a { background: url(\"https://a.example/styles/img.png\"); }"
        );
    }

    #[test]
    fn test_quoted_references() {
        assert_eq!(
            rewrite("@font-face { src: url(\"/f.woff2\"); }", &sheet_url()),
            "@font-face { src: url(\"https://a.example/f.woff2\"); }"
        );
        assert_eq!(
            rewrite("@font-face { src: url('/f.woff2'); }", &sheet_url()),
            "@font-face { src: url(\"https://a.example/f.woff2\"); }"
        );
    }

    #[test]
    fn test_protocol_relative_reference() {
        assert_eq!(
            rewrite(".a { background: url(//cdn.example/x.png); }", &sheet_url()),
            ".a { background: url(\"https://cdn.example/x.png\"); }"
        );
    }

    #[test]
    fn test_absolute_and_data_untouched() {
        let absolute = ".a { background: url(https://cdn.example/x.png); }";
        assert_eq!(rewrite(absolute, &sheet_url()), absolute);

        let data = ".a { background: url(data:image/png;base64,AAAA); }";
        assert_eq!(rewrite(data, &sheet_url()), data);
    }

    #[test]
    fn test_multiple_references_in_one_sheet() {
        let sheet = ".a { background: url(/one.png); } .b { background: url(two.png); }";
        let out = rewrite(sheet, &sheet_url());
        assert!(out.contains("url(\"https://a.example/one.png\")"));
        assert!(out.contains("url(\"https://a.example/styles/two.png\")"));
    }

    #[test]
    fn test_port_preserved_in_origin() {
        let sheet_url = Url::parse("http://a.example:8080/css/site.css").unwrap();
        assert_eq!(
            rewrite(".a { background: url(/x.png); }", &sheet_url),
            ".a { background: url(\"http://a.example:8080/x.png\"); }"
        );
    }
}
