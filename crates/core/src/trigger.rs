//! Trigger-word matching against a user's automations.

use chrono::{DateTime, Utc};

use crate::domain::automation::{Automation, TriggerScope};

/// Finds the first automation whose trigger word the message contains.
///
/// `candidates` must already be scoped to one owner and ordered the way
/// storage returns them; iteration order is deterministic and first match
/// wins, with no ranking between overlapping trigger words. Matching is a
/// case-insensitive substring test, not a token-boundary test: "demos" does
/// trigger the word "demo". That looseness is intentional and callers must
/// not tighten it.
///
/// `None` means no automation applies; it is a normal outcome, not an error.
pub fn match_automation<'a>(
    candidates: &'a [Automation],
    message_text: &str,
    scope: TriggerScope,
    now: DateTime<Utc>,
) -> Option<&'a Automation> {
    let normalized = message_text.to_lowercase();
    candidates.iter().find(|automation| {
        automation.is_active
            && !automation.is_expired(now)
            && automation.trigger_scope.accepts(scope)
            && !automation.trigger_word.is_empty()
            && normalized.contains(&automation.trigger_word)
    })
}
