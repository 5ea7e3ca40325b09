use serde::{Deserialize, Serialize};

pub const FLASH_COOKIE: &str = "_rollup_flash";
pub const FLASH_MAX_AGE: u64 = 10;

/// One-shot notice shown on the next page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlashMessage {
    Signout,
}
