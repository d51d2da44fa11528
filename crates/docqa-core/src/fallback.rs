//! A collaborator capability paired with a deterministic local fallback.
//!
//! Every stage that depends on a model (intent extraction, answer generation,
//! clause classification) goes through [`WithFallback::run`]: the primary is
//! tried when present, and any error or absence yields the fallback value.
//! The returned [`Provenance`] tells the caller which path produced the value.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Primary,
    Fallback,
}

impl Provenance {
    pub fn is_fallback(self) -> bool { self == Provenance::Fallback }
}

pub struct WithFallback<T: ?Sized> {
    stage: &'static str,
    primary: Option<Arc<T>>,
}

impl<T: ?Sized> Clone for WithFallback<T> {
    fn clone(&self) -> Self {
        Self { stage: self.stage, primary: self.primary.clone() }
    }
}

impl<T: ?Sized> WithFallback<T> {
    pub fn new(stage: &'static str, primary: Arc<T>) -> Self {
        Self { stage, primary: Some(primary) }
    }

    /// No primary collaborator; every call takes the fallback.
    pub fn fallback_only(stage: &'static str) -> Self {
        Self { stage, primary: None }
    }

    pub fn from_option(stage: &'static str, primary: Option<Arc<T>>) -> Self {
        Self { stage, primary }
    }

    pub fn stage(&self) -> &'static str { self.stage }

    pub fn has_primary(&self) -> bool { self.primary.is_some() }

    pub fn run<R>(
        &self,
        call: impl FnOnce(&T) -> anyhow::Result<R>,
        fallback: impl FnOnce() -> R,
    ) -> (R, Provenance) {
        let Some(primary) = self.primary.as_deref() else {
            tracing::debug!(stage = self.stage, "no primary collaborator; using fallback");
            return (fallback(), Provenance::Fallback);
        };
        match call(primary) {
            Ok(value) => (value, Provenance::Primary),
            Err(e) => {
                tracing::warn!(stage = self.stage, error = %e, "collaborator failed; using fallback");
                (fallback(), Provenance::Fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Doubler: Send + Sync {
        fn double(&self, x: i32) -> anyhow::Result<i32>;
    }

    struct Working;
    impl Doubler for Working {
        fn double(&self, x: i32) -> anyhow::Result<i32> { Ok(x * 2) }
    }

    struct Failing;
    impl Doubler for Failing {
        fn double(&self, _x: i32) -> anyhow::Result<i32> { anyhow::bail!("offline") }
    }

    #[test]
    fn primary_result_is_used_when_it_succeeds() {
        let cap: WithFallback<dyn Doubler> = WithFallback::new("double", Arc::new(Working));
        assert_eq!(cap.run(|d| d.double(4), || -1), (8, Provenance::Primary));
    }

    #[test]
    fn errors_and_absence_take_the_fallback() {
        let failing: WithFallback<dyn Doubler> = WithFallback::new("double", Arc::new(Failing));
        assert_eq!(failing.run(|d| d.double(4), || -1), (-1, Provenance::Fallback));

        let absent: WithFallback<dyn Doubler> = WithFallback::fallback_only("double");
        assert!(!absent.has_primary());
        let (value, provenance) = absent.run(|d| d.double(4), || -1);
        assert_eq!(value, -1);
        assert!(provenance.is_fallback());
    }
}
