use crate::error::{WtpError, WtpStatus};

/// Continuation resumed when the outstanding call completes, with the
/// completion status and the raw result bytes.
pub type Continuation = Box<dyn FnOnce(WtpStatus, &[u8])>;

/// Single-slot rendezvous between application code issuing blocking-style
/// calls and the dispatcher that completes them.
///
/// The application captures everything after its call as a continuation and
/// parks it with `suspend`; the receive dispatcher later hands the reply to
/// `resume`, which runs the continuation in place. At most one call can be
/// outstanding, which keeps calls strictly serial — the cooperative
/// single-threaded equivalent of a blocked user stack.
#[derive(Default)]
pub struct UserContext {
    pending: Option<Continuation>,
}

impl UserContext {
    pub fn new() -> Self {
        Self { pending: None }
    }

    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    /// Parks `continuation` until the reply arrives. Fails with `Already`
    /// while a previous call is still outstanding.
    pub fn suspend(&mut self, continuation: Continuation) -> Result<(), WtpError> {
        if self.pending.is_some() {
            return Err(WtpError::Already);
        }
        self.pending = Some(continuation);
        Ok(())
    }

    /// Completes the outstanding call, running its continuation with
    /// `status` and `result`. Fails with `Empty` when nothing is suspended.
    ///
    /// Invoked as an ordinary receive callback; the continuation may issue
    /// the next call (and suspend again) before this returns.
    pub fn resume(&mut self, status: WtpStatus, result: &[u8]) -> Result<(), WtpError> {
        let continuation = self.pending.take().ok_or(WtpError::Empty)?;
        continuation(status, result);
        Ok(())
    }
}
