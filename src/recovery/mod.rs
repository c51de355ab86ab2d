pub mod actions;
pub mod identity;
pub mod manager;

#[cfg(test)]
mod tests;

pub use actions::{BrowserRestarter, RecoveryAction, RecoveryActionType, RecoveryOutcome};
pub use identity::UserAgentRotator;
pub use manager::{default_fallback_selectors, ErrorRecoveryManager, FallbackSelectorEntry, RecoveryConfig};
