//! Test environment identifiers: `test-<stage>-<YYYYMMDD>-<8 hex>`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate an ID for `stage` created at `now`.
///
/// The suffix is 32 random bits, so collisions are unlikely but possible;
/// callers check the store before using an ID.
pub fn generate_test_id(stage: &str, now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("test-{stage}-{}-{}", now.format("%Y%m%d"), &random[..8])
}
