//! Per-call retry token

/// Immutable record of one logical call's attempt history.
///
/// Tokens are never mutated: every transition returns a new token. The token
/// is moved into [`crate::RetryStrategy::refresh_retry_token`] and
/// [`crate::RetryStrategy::record_success`], so a token can be recorded at
/// most once without extra synchronization.
#[derive(Debug, PartialEq, Eq)]
pub struct RetryToken {
    scope: String,
    attempts_made: u32,
    budget_debited: u32,
}

impl RetryToken {
    /// Token for the first attempt of a call. Nothing has been debited yet.
    pub fn initial(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            attempts_made: 1,
            budget_debited: 0,
        }
    }

    /// Token for the next attempt after a successful refresh.
    ///
    /// Intended for strategy implementations. `cost` is what the refresh
    /// withdrew from the scope's budget.
    pub fn next_attempt(self, cost: u32) -> Self {
        Self {
            scope: self.scope,
            attempts_made: self.attempts_made.saturating_add(1),
            budget_debited: self.budget_debited.saturating_add(cost),
        }
    }

    /// Key of the budget this call draws from.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Attempts issued so far, including the first.
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Retries attempted so far (`attempts_made - 1`).
    pub fn retries_attempted(&self) -> u32 {
        self.attempts_made.saturating_sub(1)
    }

    /// Total budget withdrawn by this call's refreshes.
    pub fn budget_debited(&self) -> u32 {
        self.budget_debited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initial_token() {
        let token = RetryToken::initial("kinesis");
        assert_eq!(token.scope(), "kinesis");
        assert_eq!(token.attempts_made(), 1);
        assert_eq!(token.retries_attempted(), 0);
        assert_eq!(token.budget_debited(), 0);
    }

    #[test]
    fn test_next_attempt_accumulates() {
        let token = RetryToken::initial("kinesis").next_attempt(5).next_attempt(0);
        assert_eq!(token.scope(), "kinesis");
        assert_eq!(token.attempts_made(), 3);
        assert_eq!(token.retries_attempted(), 2);
        assert_eq!(token.budget_debited(), 5);
    }
}
