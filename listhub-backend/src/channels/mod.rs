pub mod dispatcher;
pub mod telegram;
pub mod util;

#[cfg(test)]
mod dispatcher_tests;

/// A chat message normalized for dispatch, independent of whether it
/// arrived by polling or webhook.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,
}

/// Outcome of dispatching one message.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub reply: String,
    /// Attach the one-button cleanup keyboard to the reply
    pub offer_cleanup: bool,
}

impl DispatchResult {
    pub fn text(reply: impl Into<String>) -> Self {
        DispatchResult {
            reply: reply.into(),
            offer_cleanup: false,
        }
    }

    pub fn with_cleanup(reply: impl Into<String>) -> Self {
        DispatchResult {
            reply: reply.into(),
            offer_cleanup: true,
        }
    }
}
