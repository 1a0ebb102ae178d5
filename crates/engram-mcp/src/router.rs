//! Request Router
//!
//! The thin adapter shared by every surface: maps an operation to its rate
//! limiter class, performs the admission check, and hands the call to the
//! engine. No business logic lives here.

use std::sync::Arc;

use engram_core::{Engine, EngineError};

/// Shared application context for all surfaces
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<Engine>,
}

impl AppContext {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Rate limiter class for an operation name.
    pub fn class_for(operation: &str) -> &'static str {
        match operation {
            "store_memory" | "update_memory" | "delete_memory" => "store_memory",
            "search" => "search",
            "analysis" => "analysis",
            "relationships" => "relationships",
            "benchmark_run" => "benchmark_run",
            _ => "default",
        }
    }

    /// Admission check; a rejection surfaces as `RateLimited` with the
    /// deciding bucket and suggested wait attached.
    pub fn admit(&self, operation: &str) -> Result<(), EngineError> {
        let class = Self::class_for(operation);
        let decision = self.engine.limiter.allow(class);
        if decision.allowed {
            Ok(())
        } else {
            Err(EngineError::RateLimited {
                limit_type: decision.limit_type,
                retry_after: decision.retry_after.unwrap_or_default(),
            })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_mapping() {
        assert_eq!(AppContext::class_for("store_memory"), "store_memory");
        assert_eq!(AppContext::class_for("update_memory"), "store_memory");
        assert_eq!(AppContext::class_for("delete_memory"), "store_memory");
        assert_eq!(AppContext::class_for("search"), "search");
        assert_eq!(AppContext::class_for("analysis"), "analysis");
        assert_eq!(AppContext::class_for("relationships"), "relationships");
        assert_eq!(AppContext::class_for("stats"), "default");
    }
}
