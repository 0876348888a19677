//! Syntactic address check. Nothing here touches the network.

use regex::Regex;
use std::sync::OnceLock;

const MAX_ADDRESS_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;

fn address_regex() -> &'static Regex {
    static ADDRESS: OnceLock<Regex> = OnceLock::new();
    ADDRESS.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .expect("address regex failed to compile. This is a bug.")
    })
}

pub fn is_valid_address(address: &str) -> bool {
    if address.len() > MAX_ADDRESS_LEN || !address_regex().is_match(address) {
        return false;
    }
    match address.split_once('@') {
        Some((local, domain)) => {
            local.len() <= MAX_LOCAL_LEN
                && !local.starts_with('.')
                && !local.ends_with('.')
                && !local.contains("..")
                && domain
                    .split('.')
                    .all(|label| !label.starts_with('-') && !label.ends_with('-'))
        }
        None => false,
    }
}

/// Domain part of an address that already passed [`is_valid_address`].
pub fn domain_of(address: &str) -> Option<&str> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}
