//! Shared test-only plumbing: a `tracing` installer every crate's test
//! modules call at the top of their first test, plus a couple of assertion
//! helpers that read better than bare `assert!`.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::{prelude::*, EnvFilter};

pub mod transcript;

static INIT: Once = Once::new();

/// Installs a `tracing` subscriber reading `RUST_LOG`, plus `color-eyre`'s
/// panic/error reporting. Idempotent and safe to call at the top of every
/// `#[test]`; only the first call takes effect.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .with(ErrorLayer::default());
        // Installing a global subscriber twice is a programmer error, not a
        // condition tests should fail on; ignore the "already installed" case.
        let _ = tracing::subscriber::set_global_default(subscriber);
        let _ = color_eyre::install();
    });
}

/// A `color_eyre`-flavored `Result`, for test bodies that want `?`.
pub type Result<T> = color_eyre::eyre::Result<T>;

/// Asserts that `result` is `Ok`, printing the error via its `Display` chain
/// (rather than `Debug`) if it isn't -- most of this workspace's error
/// enums have much more readable `Display` output.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => panic!("expected Ok, got Err({})", error),
        }
    };
}

/// Asserts that `result` is `Err`, and that its `Display` output contains
/// `needle`.
#[macro_export]
macro_rules! assert_err_contains {
    ($result:expr, $needle:expr) => {
        match $result {
            Ok(_) => panic!("expected Err containing {:?}, got Ok", $needle),
            Err(error) => {
                let rendered = error.to_string();
                assert!(
                    rendered.contains($needle),
                    "error {:?} did not contain {:?}",
                    rendered,
                    $needle
                );
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn assert_ok_returns_the_value() {
        let value: Result<u32> = Ok(5);
        assert_eq!(assert_ok!(value), 5);
    }
}
