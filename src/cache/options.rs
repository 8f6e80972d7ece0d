//! Per-call request options.

use std::fmt;
use std::future::Future;
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Effective TTL substituted for strictly positive TTLs below one second.
pub const DEFAULT_ITEM_TTL: Duration = Duration::from_secs(3600);

/// Which tiers a call should bypass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SkipMode(u8);

impl SkipMode {
    pub const NONE: SkipMode = SkipMode(0);
    pub const LOCAL: SkipMode = SkipMode(1);
    pub const REMOTE: SkipMode = SkipMode(1 << 1);
    pub const ALL: SkipMode = SkipMode(1 | 1 << 1);

    /// Whether every bit of `mode` is set.
    pub fn is(self, mode: SkipMode) -> bool {
        self.0 & mode.0 == mode.0 && mode.0 != 0
    }

    /// Whether any tier is skipped.
    pub fn any(self) -> bool {
        self.0 != 0
    }
}

impl BitOr for SkipMode {
    type Output = SkipMode;

    fn bitor(self, rhs: SkipMode) -> SkipMode {
        SkipMode(self.0 | rhs.0)
    }
}

/// How a remote write treats an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Condition {
    /// Unconditional write.
    #[default]
    Always,
    /// Only overwrite an existing key (`SET ... XX`).
    IfExists,
    /// Only create a missing key (`SET ... NX`).
    IfAbsent,
}

/// Options for a single cache call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub ttl: Duration,
    pub condition: Condition,
    pub skip: SkipMode,
    pub raw: bool,
    pub group: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Remote write only if the key already exists. Replaces `with_set_nx`.
    pub fn with_set_xx(mut self) -> Self {
        self.condition = Condition::IfExists;
        self
    }

    /// Remote write only if the key is absent. Replaces `with_set_xx`.
    pub fn with_set_nx(mut self) -> Self {
        self.condition = Condition::IfAbsent;
        self
    }

    /// Keep the native value in the local tier instead of its encoding.
    pub fn with_raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Coalesce concurrent loads of the same key.
    pub fn with_group(mut self) -> Self {
        self.group = true;
        self
    }

    /// Bypass the tiers in `mode`, replacing any earlier skip setting.
    /// Combine modes with `|` to skip several.
    pub fn with_skip(mut self, mode: SkipMode) -> Self {
        self.skip = mode;
        self
    }

    /// TTL actually applied to writes.
    ///
    /// Zero stays zero (no expiry). Any positive TTL under one second is
    /// replaced by [`DEFAULT_ITEM_TTL`]; one second and above pass through.
    pub fn expiration(&self) -> Duration {
        if self.ttl.is_zero() || self.ttl >= Duration::from_secs(1) {
            self.ttl
        } else {
            DEFAULT_ITEM_TTL
        }
    }
}

/// Computes a value on cache miss.
pub type Loader<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// A get-or-compute request for `take`/`once`.
pub struct Item<T> {
    pub key: String,
    pub value: Option<T>,
    pub loader: Option<Loader<T>>,
    pub options: Options,
}

impl<T> Item<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            loader: None,
            options: Options::default(),
        }
    }

    /// Value to store on a miss when no loader is set.
    pub fn with_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_getter<F, Fut>(mut self, getter: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.loader = Some(Arc::new(move || getter().boxed()));
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.options = self.options.with_ttl(ttl);
        self
    }

    pub fn with_set_xx(mut self) -> Self {
        self.options = self.options.with_set_xx();
        self
    }

    pub fn with_set_nx(mut self) -> Self {
        self.options = self.options.with_set_nx();
        self
    }

    pub fn with_raw(mut self) -> Self {
        self.options = self.options.with_raw();
        self
    }

    pub fn with_group(mut self) -> Self {
        self.options = self.options.with_group();
        self
    }

    pub fn with_skip(mut self, mode: SkipMode) -> Self {
        self.options = self.options.with_skip(mode);
        self
    }
}

impl<T> fmt::Debug for Item<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("key", &self.key)
            .field("has_value", &self.value.is_some())
            .field("has_loader", &self.loader.is_some())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_mode_bits() {
        assert!(SkipMode::ALL.is(SkipMode::LOCAL));
        assert!(SkipMode::ALL.is(SkipMode::REMOTE));
        assert!(!SkipMode::LOCAL.is(SkipMode::REMOTE));
        assert!(!SkipMode::REMOTE.is(SkipMode::ALL));
        assert!(!SkipMode(0).any());
        assert!(SkipMode::LOCAL.any());
        assert_eq!(SkipMode::LOCAL | SkipMode::REMOTE, SkipMode::ALL);
    }

    #[test]
    fn test_expiration_boundaries() {
        let opts = |ttl| Options::new().with_ttl(ttl).expiration();
        assert_eq!(opts(Duration::ZERO), Duration::ZERO);
        assert_eq!(opts(Duration::from_nanos(1)), DEFAULT_ITEM_TTL);
        assert_eq!(opts(Duration::from_millis(999)), DEFAULT_ITEM_TTL);
        assert_eq!(opts(Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(opts(Duration::from_secs(90)), Duration::from_secs(90));
    }

    #[test]
    fn test_conditions_are_exclusive() {
        let opts = Options::new().with_set_xx().with_set_nx();
        assert_eq!(opts.condition, Condition::IfAbsent);
        let opts = Options::new().with_set_nx().with_set_xx();
        assert_eq!(opts.condition, Condition::IfExists);
    }

    #[test]
    fn test_skip_replaces_previous_mode() {
        let opts = Options::new()
            .with_skip(SkipMode::LOCAL)
            .with_skip(SkipMode::REMOTE);
        assert_eq!(opts.skip, SkipMode::REMOTE);

        let opts = Options::new()
            .with_skip(SkipMode::ALL)
            .with_skip(SkipMode::NONE);
        assert!(!opts.skip.any());

        let opts = Options::new().with_skip(SkipMode::LOCAL | SkipMode::REMOTE);
        assert_eq!(opts.skip, SkipMode::ALL);
    }

    #[tokio::test]
    async fn test_item_getter() {
        let item = Item::new("k")
            .with_getter(|| async { Ok(41 + 1) })
            .with_ttl(Duration::from_secs(5))
            .with_group();
        assert!(item.options.group);
        let loader = item.loader.clone().unwrap();
        assert_eq!(loader().await.unwrap(), 42);
    }
}
