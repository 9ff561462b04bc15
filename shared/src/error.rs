use thiserror::Error;

/// Failure of a single webhook call. Never surfaced to the page directly;
/// [`crate::backend::Backend`] turns it into a fallback value and a notice.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("request to {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned status {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("{operation} returned an unreadable body: {reason}")]
    Decode { operation: &'static str, reason: String },
}

impl WebhookError {
    pub fn operation(&self) -> &'static str {
        match self {
            WebhookError::Transport { operation, .. }
            | WebhookError::Status { operation, .. }
            | WebhookError::Decode { operation, .. } => operation,
        }
    }
}

/// Key form problems caught before any network call, or attempts made in the
/// wrong state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("No payment email available")]
    NoDefaultEmail,

    #[error("Uncheck the payment email option to enter a different address")]
    EmailLocked,

    #[error("A verification attempt is already in progress")]
    AttemptInFlight,

    #[error("API keys have already been verified")]
    AlreadyCompleted,
}

/// Invitation list problems. Everything except `SubmissionFailed` is caught
/// locally and blocks the network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvitationError {
    #[error("Add at least one user to invite")]
    NoInvitees,

    #[error("Name is required for user {}", .index + 1)]
    EmptyName { index: usize },

    #[error("Invalid email address for user {}", .index + 1)]
    InvalidEmail { index: usize },

    #[error("You can only invite {seats} more user(s)")]
    TooManyInvitees { seats: u32 },

    #[error("{email} is already in the list")]
    DuplicateEmail { email: String },

    #[error("{email} already has access")]
    ExistingEmail { email: String },

    #[error("No user at position {}", .index + 1)]
    NoSuchEntry { index: usize },

    #[error("Users have already been invited")]
    AlreadySubmitted,

    #[error("Failed to invite users. Please try again.")]
    SubmissionFailed,
}
