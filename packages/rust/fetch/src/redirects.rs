//! Redirect-chain validation against registrable root domains.
//!
//! CDN setups frequently bounce ads.txt requests through `www.` hosts or a
//! single static-hosting domain. A chain is acceptable when it ends on the
//! original root, or when it goes off-root for exactly the final hop.

use url::Url;

/// Registrable root label of a hostname: the part directly under the public
/// suffix (`example` for `sub.example.co.uk`). `None` for IPs and suffixes.
pub(crate) fn root_domain(host: &str) -> Option<String> {
    let registrable = psl::domain_str(host)?;
    registrable.split('.').next().map(str::to_owned)
}

/// Validate the redirect chain for a fetch that started at `original`.
///
/// `chain` holds the successive redirect target locations, the last being
/// the URL that finally answered. Rules:
/// - chains ending on the original root (including `www.` variants) pass;
/// - a final off-root hop passes iff the location before it was on-root
///   (the original request counts as "before" for single-hop chains);
/// - anything whose last two locations are both off-root is rejected.
pub(crate) fn chain_stays_on_root(original: &str, chain: &[Url]) -> bool {
    let Some(origin_root) = root_domain(original) else {
        return false;
    };
    let Some(final_host) = chain.last().and_then(Url::host_str) else {
        return false;
    };

    if root_domain(final_host).as_deref() == Some(origin_root.as_str()) {
        return true;
    }

    // Off-root destination: only a single hop off the root is allowed.
    let previous_host = if chain.len() >= 2 {
        chain[chain.len() - 2].host_str()
    } else {
        Some(original)
    };
    previous_host
        .and_then(root_domain)
        .is_some_and(|root| root == origin_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hops(urls: &[&str]) -> Vec<Url> {
        urls.iter()
            .map(|u| Url::parse(u).expect("test url"))
            .collect()
    }

    #[test]
    fn root_domain_strips_subdomains_and_suffix() {
        assert_eq!(root_domain("example.com").as_deref(), Some("example"));
        assert_eq!(root_domain("www.example.com").as_deref(), Some("example"));
        assert_eq!(root_domain("sub.example.co.uk").as_deref(), Some("example"));
        assert_eq!(root_domain("127.0.0.1"), None);
    }

    #[test]
    fn same_root_hops_accepted() {
        // Three hops, all on the original root.
        let chain = hops(&[
            "http://www.example.com/ads.txt",
            "https://www.example.com/ads.txt",
            "https://cdn.example.com/ads.txt",
        ]);
        assert!(chain_stays_on_root("example.com", &chain));
    }

    #[test]
    fn single_off_root_hop_accepted() {
        let chain = hops(&["http://adstxt-host.com/serve/example.com"]);
        assert!(chain_stays_on_root("example.com", &chain));
    }

    #[test]
    fn off_root_hop_after_same_root_hop_accepted() {
        let chain = hops(&[
            "https://www.example.com/ads.txt",
            "http://adstxt-host.com/serve/example.com",
        ]);
        assert!(chain_stays_on_root("example.com", &chain));
    }

    #[test]
    fn two_consecutive_off_root_hops_rejected() {
        let chain = hops(&[
            "http://adstxt-host.com/serve/example.com",
            "http://other-host.net/final",
        ]);
        assert!(!chain_stays_on_root("example.com", &chain));
    }

    #[test]
    fn www_variant_counts_as_same_root() {
        let chain = hops(&["http://www.example.com/ads.txt"]);
        assert!(chain_stays_on_root("example.com", &chain));
    }

    #[test]
    fn invalid_original_host_rejected() {
        let chain = hops(&["http://example.com/ads.txt"]);
        assert!(!chain_stays_on_root("127.0.0.1", &chain));
    }
}
