//! Per-class transaction admission control.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::bucket::TokenBucket;
use crate::config::TollgateConfig;

/// A class of outbound transaction, gated by its own token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionClass {
    /// Every transaction against a remote backend
    General,
    /// The backend's general API calls
    ApiGeneral,
    /// The backend's upload calls
    Upload,
}

impl fmt::Display for TransactionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionClass::General => "general",
            TransactionClass::ApiGeneral => "api-general",
            TransactionClass::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Outcome of an admission call.
///
/// Every variant permits the transaction: admission only ever delays a
/// caller, it never rejects one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A permit was consumed, possibly after waiting.
    Granted,
    /// The class has no limiter configured; no wait, no permit.
    Unthrottled,
    /// The caller's token fired before a permit became available. The
    /// reservoir is untouched.
    Cancelled,
}

/// Limiter slot for one transaction class.
enum ClassSlot {
    Disabled,
    Active(Arc<TokenBucket>),
}

/// The admission controller for outbound transactions.
///
/// Holds one independently configured token bucket per transaction class.
/// This struct is thread-safe and is shared by every caller issuing
/// transactions; the classes never share permits or coordinate.
pub struct TransactionLimiter {
    general: RwLock<ClassSlot>,
    api_general: RwLock<ClassSlot>,
    upload: RwLock<ClassSlot>,
}

impl TransactionLimiter {
    /// Create a limiter with every class unthrottled.
    pub fn new() -> Self {
        Self {
            general: RwLock::new(ClassSlot::Disabled),
            api_general: RwLock::new(ClassSlot::Disabled),
            upload: RwLock::new(ClassSlot::Disabled),
        }
    }

    /// Create a limiter with every class seeded from configuration.
    pub fn from_config(config: &TollgateConfig) -> Self {
        let limiter = Self::new();

        limiter.configure(
            TransactionClass::General,
            config.general.rate,
            config.general.burst,
        );
        limiter.configure(
            TransactionClass::ApiGeneral,
            config.api_general.rate,
            config.api_general.burst,
        );
        limiter.configure(
            TransactionClass::Upload,
            config.upload.rate,
            config.upload.burst,
        );

        limiter
    }

    /// Start the token bucket for a transaction class if necessary.
    ///
    /// A non-positive `rate` leaves the class's slot untouched. A
    /// non-positive `burst` is coerced to 1 so an enabled bucket can
    /// always hold a permit. Configuring an already active class replaces
    /// its bucket outright; permits accumulated under the previous
    /// configuration are discarded.
    pub fn configure(&self, class: TransactionClass, rate: f64, burst: i32) {
        if rate <= 0.0 || rate.is_nan() {
            return;
        }
        let burst = burst.max(1) as u32;

        info!(
            class = %class,
            rate = rate,
            burst = burst,
            "Starting transaction limiter"
        );
        *self.slot(class).write() = ClassSlot::Active(Arc::new(TokenBucket::new(rate, burst)));
    }

    /// Admit one transaction of the given class.
    ///
    /// Returns immediately when the class is unthrottled. Otherwise blocks
    /// until a permit is consumed or `cancel` fires, whichever comes
    /// first. It should be called once per transaction; it never fails the
    /// transaction, cancellation merely abandons the wait.
    pub async fn acquire(&self, class: TransactionClass, cancel: &CancellationToken) -> Admission {
        let bucket = match &*self.slot(class).read() {
            ClassSlot::Disabled => return Admission::Unthrottled,
            ClassSlot::Active(bucket) => Arc::clone(bucket),
        };

        if bucket.acquire(cancel).await {
            Admission::Granted
        } else {
            Admission::Cancelled
        }
    }

    fn slot(&self, class: TransactionClass) -> &RwLock<ClassSlot> {
        match class {
            TransactionClass::General => &self.general,
            TransactionClass::ApiGeneral => &self.api_general,
            TransactionClass::Upload => &self.upload,
        }
    }
}

impl Default for TransactionLimiter {
    fn default() -> Self {
        Self::new()
    }
}
