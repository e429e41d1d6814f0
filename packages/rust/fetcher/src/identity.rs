//! Request identity rotation.
//!
//! Attempt 1 presents the target's own origin as referer; later attempts pick a
//! random well-known referer. The user agent is drawn fresh every attempt.

use rand::seq::IndexedRandom;
use url::Url;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/120.0.0.0 Safari/537.36",
];

const COMMON_REFERERS: &[&str] = &[
    "https://www.fda.gov/safety/",
    "https://www.fsis.usda.gov/",
    "https://www.food.gov.uk/",
    "https://www.fsai.ie/",
    "https://www.foodstandards.gov.au/",
    "https://www.mpi.govt.nz/",
    "https://recalls-rappels.canada.ca/en/",
    "https://www.cdph.ca.gov/",
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
];

/// Headers identifying one download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: String,
    pub referer: String,
}

impl RequestIdentity {
    /// Pick an identity for the given 1-based attempt.
    pub fn for_attempt(uri: &str, attempt: u32) -> Self {
        let mut rng = rand::rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .to_string();

        let referer = match origin_of(uri) {
            Some(origin) if attempt <= 1 => origin,
            _ => COMMON_REFERERS
                .choose(&mut rng)
                .copied()
                .unwrap_or(COMMON_REFERERS[0])
                .to_string(),
        };

        Self {
            user_agent,
            referer,
        }
    }
}

/// `scheme://host[:port]/` of a URI.
fn origin_of(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    url.host_str()?;
    Some(format!("{}/", url.origin().ascii_serialization()))
}
