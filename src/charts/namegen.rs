//! Random name suffixes for generated resources

use rand::Rng;
use rand::distributions::Alphanumeric;

const SUFFIX_LEN: usize = 5;

/// Random lowercase alphanumeric string of length `len`
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

/// Append a random suffix to `base`, e.g. `nodepool-x8k2q`
pub fn append_random_string(base: &str) -> String {
    format!("{}-{}", base, random_string(SUFFIX_LEN))
}
