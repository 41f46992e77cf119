//! Environment-variable configuration shared by every binary.
//!
//! The core never reads environment variables directly outside of this module; each binary's
//! `#[clap(env = "...")]` attribute names its own fallback env var directly, since clap's derive
//! attributes take string literals rather than references to shared constants.

use std::env;

/// Force the process into UTC, as every timestamp in this system is already UTC and mixing in
/// the local zone would silently corrupt scan-identity comparisons.
pub fn force_utc() {
    env::set_var("TZ", "UTC");
}
