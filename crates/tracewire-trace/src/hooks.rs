//! Call-phase hooks fired around an intercepted method.
//!
//! The host fires [`CallPhase::Before`], runs the call, then fires either
//! `After(Some(ret))` or `Exception(err)` followed by `After(None)`. All
//! phases of one call share the same [`Invocation`] token.

use std::borrow::BorrowMut;
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracewire_core::ExecutionUnitId;

/// Identifies the intercepted method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub owner: &'static str,
    pub name: &'static str,
}

impl MethodDescriptor {
    pub const fn new(owner: &'static str, name: &'static str) -> Self {
        Self { owner, name }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.name)
    }
}

/// Correlates the phases of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallToken {
    pub unit: ExecutionUnitId,
    pub call_id: u64,
}

static NEXT_CALL: AtomicU64 = AtomicU64::new(1);

impl CallToken {
    pub fn new(unit: ExecutionUnitId) -> Self {
        Self {
            unit,
            call_id: NEXT_CALL.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Everything a hook may inspect about the call.
pub struct Invocation<'a, T: ?Sized, A: ?Sized> {
    pub token: CallToken,
    pub method: &'a MethodDescriptor,
    pub target: &'a T,
    pub args: &'a A,
}

impl<'a, T: ?Sized, A: ?Sized> Invocation<'a, T, A> {
    pub fn new(unit: ExecutionUnitId, method: &'a MethodDescriptor, target: &'a T, args: &'a A) -> Self {
        Self {
            token: CallToken::new(unit),
            method,
            target,
            args,
        }
    }

    pub fn unit(&self) -> ExecutionUnitId {
        self.token.unit
    }
}

pub enum CallPhase<'a, R: ?Sized> {
    Before,
    /// The call failed. `After(None)` follows.
    Exception(&'a (dyn StdError + 'static)),
    /// The call returned. `None` when it failed.
    After(Option<&'a mut R>),
}

pub trait Interceptor: Send + Sync {
    type Target: ?Sized;
    type Args: ?Sized;
    type Output: ?Sized;

    /// React to one phase. Hooks never fail and never alter the call's outcome.
    fn intercept(
        &self,
        call: &Invocation<'_, Self::Target, Self::Args>,
        phase: CallPhase<'_, Self::Output>,
    );
}

/// Run `call` between the phases of `interceptor`, returning its result unchanged.
pub fn around<I, O, E>(
    interceptor: &I,
    invocation: &Invocation<'_, I::Target, I::Args>,
    call: impl FnOnce() -> Result<O, E>,
) -> Result<O, E>
where
    I: Interceptor,
    O: BorrowMut<I::Output>,
    E: StdError + 'static,
{
    interceptor.intercept(invocation, CallPhase::Before);
    match call() {
        Ok(mut ret) => {
            interceptor.intercept(invocation, CallPhase::After(Some(ret.borrow_mut())));
            Ok(ret)
        }
        Err(err) => {
            interceptor.intercept(invocation, CallPhase::Exception(&err));
            interceptor.intercept(invocation, CallPhase::After(None));
            Err(err)
        }
    }
}
