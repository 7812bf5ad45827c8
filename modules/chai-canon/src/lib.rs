//! URL canonicalization: the fixed-point normalization used as the identity
//! key for merging packages and URLs across ecosystems.

use std::collections::BTreeSet;

use percent_encoding::percent_decode_str;
use url::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CanonError {
    #[error("malformed URL: {0}")]
    Malformed(String),
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("empty host")]
    EmptyHost,
}

pub type Result<T> = std::result::Result<T, CanonError>;

/// Forges that get `http` upgraded to `https` and trailing `.git` stripped.
const WELL_KNOWN_FORGES: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "codeberg.org",
    "sr.ht",
    "git.sr.ht",
];

/// Hosts whose plaintext `http` form is always upgraded, even if they are
/// not "forges" in the `.git`-stripping sense.
const HTTPS_UPGRADE_HOSTS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "codeberg.org",
    "sr.ht",
    "git.sr.ht",
    "sourceforge.net",
    "crates.io",
    "rubygems.org",
    "pypi.org",
    "npmjs.com",
    "readthedocs.io",
    "docs.rs",
];

/// Query parameters stripped because they carry no identity, only
/// attribution/tracking noise.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
];

/// Normalize `input` to its canonical form.
///
/// Idempotent: `canonical(canonical(u)?)? == canonical(u)?` for all `u`.
pub fn canonical(input: &str) -> Result<String> {
    let mut url = Url::parse(input).map_err(|e| CanonError::Malformed(e.to_string()))?;

    let scheme = url.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" && scheme != "git" {
        return Err(CanonError::UnsupportedScheme(scheme));
    }

    let host = url
        .host_str()
        .ok_or(CanonError::EmptyHost)?
        .to_ascii_lowercase();
    if host.is_empty() {
        return Err(CanonError::EmptyHost);
    }
    url.set_host(Some(&host))
        .map_err(|e| CanonError::Malformed(e.to_string()))?;

    if scheme == "http" && HTTPS_UPGRADE_HOSTS.contains(&host.as_str()) {
        url.set_scheme("https")
            .map_err(|_| CanonError::Malformed("failed to upgrade scheme".to_string()))?;
    }

    strip_default_port(&mut url);
    strip_trailing_slash(&mut url);
    strip_index_page(&mut url);
    if WELL_KNOWN_FORGES.contains(&host.as_str()) {
        strip_dot_git(&mut url);
    }
    decode_path_segments(&mut url);
    strip_tracking_params(&mut url);
    strip_empty_fragment(&mut url);

    let mut out = url.to_string();
    // `url` always serializes a minimum `/` path once an authority is present
    // (WHATWG URL rules for special schemes), so a bare host-root can only be
    // made slash-less by trimming the serialized string directly.
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() && out.ends_with('/') {
        out.pop();
    }

    Ok(out)
}

/// `true` iff `url` is already in its canonical form.
pub fn is_canonical(url: &str) -> bool {
    matches!(canonical(url), Ok(c) if c == url)
}

fn strip_default_port(url: &mut Url) {
    let default = match url.scheme() {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    };
    if url.port() == default {
        let _ = url.set_port(None);
    }
}

fn strip_trailing_slash(url: &mut Url) {
    if url.cannot_be_a_base() {
        return;
    }
    // The bare host-root case (`path() == "/"`) can't be trimmed here — `url`
    // always re-serializes a minimum `/` once an authority is present. That
    // case is handled as a final string-level step in `canonical()`.
    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }
}

fn strip_index_page(url: &mut Url) {
    if url.cannot_be_a_base() {
        return;
    }
    let path = url.path();
    for suffix in ["/index.html", "/index.htm"] {
        if let Some(prefix) = path.strip_suffix(suffix) {
            url.set_path(prefix);
            return;
        }
    }
}

fn strip_dot_git(url: &mut Url) {
    if url.cannot_be_a_base() {
        return;
    }
    let path = url.path();
    if let Some(prefix) = path.strip_suffix(".git") {
        url.set_path(prefix);
    }
}

/// Decode percent-encoded path segments that don't need encoding, so `%2B`
/// and `+` compare equal while `%2F` (an encoded slash, a different path
/// shape) is left alone.
fn decode_path_segments(url: &mut Url) {
    if url.cannot_be_a_base() {
        return;
    }
    let Some(segments) = url.path_segments() else {
        return;
    };
    let decoded: Vec<String> = segments
        .map(|s| {
            percent_decode_str(s)
                .decode_utf8()
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();
    if let Ok(mut path_segments) = url.path_segments_mut() {
        path_segments.clear();
        path_segments.extend(&decoded);
    }
}

fn strip_tracking_params(url: &mut Url) {
    let kept: BTreeSet<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &kept {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }
}

fn strip_empty_fragment(url: &mut Url) {
    if url.fragment() == Some("") {
        url.set_fragment(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash() {
        // host-only root collapses to no path at all
        assert_eq!(canonical("https://serde.rs/").unwrap(), "https://serde.rs");
        assert_eq!(canonical("https://example.com/").unwrap(), "https://example.com");
        assert_eq!(
            canonical("https://example.com/proj/").unwrap(),
            "https://example.com/proj"
        );
    }

    #[test]
    fn lowercases_host() {
        assert_eq!(
            canonical("https://GitHub.com/rust-lang/rust").unwrap(),
            "https://github.com/rust-lang/rust"
        );
    }

    #[test]
    fn upgrades_http_to_https_for_well_known_hosts() {
        assert_eq!(
            canonical("http://github.com/rust-lang/rust").unwrap(),
            "https://github.com/rust-lang/rust"
        );
    }

    #[test]
    fn leaves_unknown_host_http_alone() {
        assert_eq!(
            canonical("http://example.com/proj").unwrap(),
            "http://example.com/proj"
        );
    }

    #[test]
    fn strips_default_port() {
        assert_eq!(
            canonical("https://example.com:443/proj").unwrap(),
            "https://example.com/proj"
        );
        assert_eq!(
            canonical("http://example.com:80/proj").unwrap(),
            "http://example.com/proj"
        );
        assert_eq!(
            canonical("https://example.com:8443/proj").unwrap(),
            "https://example.com:8443/proj"
        );
    }

    #[test]
    fn strips_index_html() {
        assert_eq!(
            canonical("https://example.com/proj/index.html").unwrap(),
            "https://example.com/proj"
        );
    }

    #[test]
    fn strips_git_suffix_on_well_known_forges() {
        assert_eq!(
            canonical("https://github.com/pypa/sample.git").unwrap(),
            "https://github.com/pypa/sample"
        );
    }

    #[test]
    fn does_not_strip_git_suffix_on_unknown_host() {
        assert_eq!(
            canonical("https://example.com/proj.git").unwrap(),
            "https://example.com/proj.git"
        );
    }

    #[test]
    fn strips_tracking_params_but_keeps_others() {
        assert_eq!(
            canonical("https://example.com/proj?utm_source=x&ref=y&page=2").unwrap(),
            "https://example.com/proj?page=2"
        );
        assert_eq!(
            canonical("https://example.com/proj?utm_source=x").unwrap(),
            "https://example.com/proj"
        );
    }

    #[test]
    fn rejects_non_http_git_scheme() {
        assert_eq!(
            canonical("ftp://example.com/proj"),
            Err(CanonError::UnsupportedScheme("ftp".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(canonical("not a url").is_err());
    }

    #[test]
    fn rejects_invalid_ipv6_bracketing() {
        assert!(canonical("https://[::1:80/proj").is_err());
    }

    #[test]
    fn is_canonical_matches_fixed_point() {
        assert!(is_canonical("https://serde.rs/proj"));
        assert!(!is_canonical("https://serde.rs/proj/"));
        assert!(!is_canonical("http://github.com/rust-lang/rust"));
        assert!(is_canonical("https://serde.rs"));
        assert!(!is_canonical("https://serde.rs/"));
    }

    #[test]
    fn idempotent_over_table() {
        let cases = [
            "https://serde.rs/",
            "http://github.com/rust-lang/rust.git",
            "https://EXAMPLE.com/Proj/index.html",
            "https://example.com:443/proj?utm_source=x&page=2",
            "https://example.com/sample%2Bnamespace",
        ];
        for case in cases {
            let once = canonical(case).unwrap();
            let twice = canonical(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {case}");
        }
    }
}
