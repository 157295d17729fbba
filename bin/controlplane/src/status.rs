//! Merges live container state with in-flight transient state.
//! Precedence: transient > live > unknown.

use crate::model::{ServiceStatus, TransientState};

pub fn merge(live: ServiceStatus, transient: Option<TransientState>) -> ServiceStatus {
  match transient {
    Some(t) => t.as_status(),
    None => live,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transient_state_overrides_live_state() {
    assert_eq!(
      merge(ServiceStatus::Stopped, Some(TransientState::Restarting)),
      ServiceStatus::Restarting
    );
  }

  #[test]
  fn live_state_used_when_no_transient() {
    assert_eq!(merge(ServiceStatus::Running, None), ServiceStatus::Running);
  }
}
