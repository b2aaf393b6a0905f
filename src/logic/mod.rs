mod key_match;
mod selection;

pub use key_match::check_key_matches;
pub use selection::{AliasSelector, IssuerAlgorithmSelector};
