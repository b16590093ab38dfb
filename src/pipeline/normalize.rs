//! URL canonicalization and content fingerprints.
//!
//! Canonicalization drops tracking noise so that syndicated copies of the
//! same article collapse to one canonical key. Fingerprints are versioned;
//! bump the prefix constant whenever the canonicalization rules change so
//! stored pools are never compared across rule sets.

use sha2::{Digest, Sha256};
use url::Url;

/// Fingerprint format version; part of every hashed preimage.
pub const FINGERPRINT_VERSION: &str = "ITEMFP_V1";

/// Query parameters stripped during canonicalization.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "ref",
    "ref_src",
    "cmpid",
    "smid",
    "mc_cid",
    "mc_eid",
];

/// Number of body tokens that participate in the content fingerprint.
const FINGERPRINT_TOKENS: usize = 24;

/// Canonicalize a URL for dedup keys.
///
/// Lowercases scheme and host, strips fragments, default ports, tracking
/// query parameters, and trailing slashes. Returns the input unchanged when
/// it does not parse as an absolute URL.
pub fn canonical_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    // Url::parse already lowercases scheme/host and drops default ports.
    let mut out = url.to_string();
    while out.ends_with('/') && out.matches('/').count() > 3 {
        out.pop();
    }
    out
}

/// Hostname of a URL, for the hydrator's per-host politeness ledger.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw).ok()?.host_str().map(|h| h.to_lowercase())
}

fn sha256_hex(preimage: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable item id: hash of the canonical URL (title-independent, so edits to
/// a headline do not mint a new item).
pub fn item_id(canonical_url: &str) -> String {
    let digest = sha256_hex(&format!("{FINGERPRINT_VERSION}|id|{canonical_url}"));
    format!("itm_{}", &digest[..16])
}

/// Normalize a title for near-duplicate comparison: lowercase, alphanumeric
/// words only, whitespace collapsed.
pub fn normalized_title(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content fingerprint: normalized title plus the first N body tokens.
/// Near-duplicate syndications share this even when URLs differ.
pub fn content_fingerprint(title: &str, body: &str) -> String {
    let title_part = normalized_title(title);
    let body_part = body
        .split_whitespace()
        .take(FINGERPRINT_TOKENS)
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let digest = sha256_hex(&format!("{FINGERPRINT_VERSION}|content|{title_part}|{body_part}"));
    format!("cfp_{}", &digest[..16])
}

/// Fingerprint over a whole run: canonicalized event ids plus a config
/// snapshot string. Byte-identical inputs yield byte-identical output.
pub fn run_fingerprint(event_ids: &[String], config_snapshot: &str) -> String {
    let mut ids: Vec<&str> = event_ids.iter().map(|s| s.as_str()).collect();
    ids.sort_unstable();
    sha256_hex(&format!(
        "{FINGERPRINT_VERSION}|run|{}|{config_snapshot}",
        ids.join(",")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_strips_tracking_and_fragment() {
        let url = "https://Example.com/story?utm_source=rss&id=7#section";
        assert_eq!(canonical_url(url), "https://example.com/story?id=7");
    }

    #[test]
    fn canonical_url_drops_empty_query_and_trailing_slash() {
        assert_eq!(
            canonical_url("https://example.com/a/b/?utm_medium=feed"),
            "https://example.com/a/b"
        );
    }

    #[test]
    fn canonical_url_keeps_root_slash() {
        assert_eq!(canonical_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn canonical_url_passes_through_garbage() {
        assert_eq!(canonical_url("not a url"), "not a url");
    }

    #[test]
    fn item_id_is_stable_and_prefixed() {
        let a = item_id("https://example.com/story");
        let b = item_id("https://example.com/story");
        assert_eq!(a, b);
        assert!(a.starts_with("itm_"));
        assert_ne!(a, item_id("https://example.com/other"));
    }

    #[test]
    fn content_fingerprint_ignores_case_and_punctuation_in_title() {
        let a = content_fingerprint("OpenAI Ships GPT-5!", "The model is here today.");
        let b = content_fingerprint("openai ships gpt 5", "The model is here today.");
        assert_eq!(a, b);
    }

    #[test]
    fn content_fingerprint_differs_past_token_window() {
        let base = "word ".repeat(24);
        let a = content_fingerprint("t", &format!("{base} tail-one"));
        let b = content_fingerprint("t", &format!("{base} tail-two"));
        // Divergence beyond the first 24 tokens is invisible to the fingerprint.
        assert_eq!(a, b);
    }

    #[test]
    fn run_fingerprint_is_order_independent() {
        let a = run_fingerprint(&["itm_b".into(), "itm_a".into()], "cfg");
        let b = run_fingerprint(&["itm_a".into(), "itm_b".into()], "cfg");
        assert_eq!(a, b);
        assert_ne!(a, run_fingerprint(&["itm_a".into()], "cfg"));
    }

    #[test]
    fn host_of_lowercases() {
        assert_eq!(host_of("https://News.Example.COM/x"), Some("news.example.com".into()));
        assert_eq!(host_of("::"), None);
    }
}
