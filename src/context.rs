//! Request Context
//!
//! Context threaded through every store call of a batch.
//! Carries access options, a request id for log correlation, and the
//! deadline/cancellation state checked before each suspension point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::acl::{AccessControlOptions, Principal};
use crate::error::{RecordError, RecordResult};

/// Handle used by another thread to cancel an in-flight request
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Context carried through the execution of one batch
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request ID for tracing
    pub request_id: Uuid,

    access: AccessControlOptions,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    /// Create a context evaluated as `principal`
    pub fn new(principal: Principal) -> Self {
        Self::with_options(AccessControlOptions::view_as(principal))
    }

    /// Create a privileged context (bypasses access control)
    pub fn privileged(principal: Principal) -> Self {
        Self::with_options(AccessControlOptions::privileged(principal))
    }

    /// Create an anonymous context
    pub fn anonymous() -> Self {
        Self::new(Principal::anonymous())
    }

    pub fn with_options(access: AccessControlOptions) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            access,
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fail store calls once `timeout` has elapsed from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn access(&self) -> &AccessControlOptions {
        &self.access
    }

    pub fn principal(&self) -> &Principal {
        self.access.principal()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Check the context before a store call
    pub fn ensure_active(&self) -> RecordResult<()> {
        if self.is_cancelled() {
            return Err(RecordError::timeout("request cancelled"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RecordError::timeout("request deadline exceeded"));
            }
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_fresh_context_is_active() {
        let ctx = RequestContext::new(Principal::user("u1"));
        assert!(ctx.ensure_active().is_ok());
        assert!(!ctx.access().bypass_access_control());
    }

    #[test]
    fn test_cancel_handle_stops_context() {
        let ctx = RequestContext::anonymous();
        let clone = ctx.clone();
        ctx.cancel_handle().cancel();

        let err = clone.ensure_active().unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequestTimeout);
    }

    #[test]
    fn test_expired_deadline() {
        let ctx = RequestContext::anonymous().with_timeout(Duration::ZERO);
        assert!(ctx.ensure_active().is_err());
    }

    #[test]
    fn test_privileged_context() {
        let ctx = RequestContext::privileged(Principal::anonymous());
        assert!(ctx.access().bypass_access_control());
    }
}
