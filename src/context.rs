//! # Run Context
//!
//! A `RunContext` carries caller-supplied data through one run. Instruction
//! functions, tool executions, enablement predicates, guardrails, and
//! lifecycle hooks all receive a reference to it. The runtime itself never
//! reads or writes the payload; it only threads it through.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased, cheaply clonable container for caller data scoped to one run.
///
/// The payload is stored behind an `Arc`, so cloning the context shares the
/// same underlying value. The framework treats it as opaque and immutable;
/// callers that need interior mutability can store a `Mutex` themselves.
///
/// ## Example
///
/// ```rust
/// use agent_relay::context::RunContext;
///
/// struct UserProfile {
///     name: String,
///     is_admin: bool,
/// }
///
/// let ctx = RunContext::new(UserProfile {
///     name: "Tehreem".to_string(),
///     is_admin: false,
/// });
///
/// let profile = ctx.get::<UserProfile>().unwrap();
/// assert_eq!(profile.name, "Tehreem");
/// assert!(ctx.get::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct RunContext {
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl RunContext {
    /// Wraps a caller value in a run context.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            payload: Some(Arc::new(value)),
        }
    }

    /// A context carrying no payload, for runs that need none.
    pub fn empty() -> Self {
        Self { payload: None }
    }

    /// Returns the payload downcast to `T`, or `None` if the context is
    /// empty or holds a different type.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Whether any payload is attached.
    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct User {
        name: String,
        is_student: bool,
    }

    #[test]
    fn test_typed_access() {
        let ctx = RunContext::new(User {
            name: "Tehreem".to_string(),
            is_student: true,
        });

        let user = ctx.get::<User>().expect("payload present");
        assert_eq!(user.name, "Tehreem");
        assert!(user.is_student);
        assert!(!ctx.is_empty());
    }

    #[test]
    fn test_wrong_type_is_none() {
        let ctx = RunContext::new(42usize);
        assert!(ctx.get::<String>().is_none());
        assert_eq!(ctx.get::<usize>(), Some(&42));
    }

    #[test]
    fn test_empty_context() {
        let ctx = RunContext::empty();
        assert!(ctx.is_empty());
        assert!(ctx.get::<User>().is_none());
    }

    #[test]
    fn test_clone_shares_payload() {
        let ctx = RunContext::new("shared".to_string());
        let cloned = ctx.clone();
        assert_eq!(
            ctx.get::<String>().map(|s| s.as_ptr()),
            cloned.get::<String>().map(|s| s.as_ptr())
        );
    }
}
