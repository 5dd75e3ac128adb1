//! Failure values produced by checks, argument parsing and handlers.
//!
//! Every failure is consumed exactly once by [`crate::framework::classify`].

use crate::gateway::GatewayError;

pub type CommandResult<T = ()> = Result<T, Failure>;

#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("Command \"{0}\" is not found")]
    NotFound(String),

    /// A precondition failed and the author simply does not qualify.
    #[error("The check functions for this command failed.")]
    CheckFailed,

    #[error("{0}")]
    GuildRestricted(String),

    #[error("You are missing {0} permission(s) to run this command.")]
    PermissionDenied(String),

    #[error("{0}")]
    BadArgument(String),

    #[error("{0} is a required argument that is missing.")]
    MissingArgument(String),

    #[error("You are on cooldown. Try again in {retry_after:.2}s")]
    OnCooldown { retry_after: f64 },

    #[error(transparent)]
    ExternalApi(#[from] ExternalFailure),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{0:#}")]
    Unclassified(#[from] anyhow::Error),
}

impl Failure {
    pub fn bad_argument(message: impl Into<String>) -> Self {
        Failure::BadArgument(message.into())
    }

    /// Short machine-friendly name used in logs and escalation reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Failure::NotFound(_) => "not_found",
            Failure::CheckFailed => "check_failed",
            Failure::GuildRestricted(_) => "guild_restricted",
            Failure::PermissionDenied(_) => "permission_denied",
            Failure::BadArgument(_) => "bad_argument",
            Failure::MissingArgument(_) => "missing_argument",
            Failure::OnCooldown { .. } => "on_cooldown",
            Failure::ExternalApi(_) => "external_api",
            Failure::Gateway(_) => "gateway",
            Failure::Unclassified(_) => "unclassified",
        }
    }
}

/// Failure of a third-party HTTP API called from a command handler.
#[derive(Debug, thiserror::Error)]
pub enum ExternalFailure {
    #[error("{service} took too long to respond.")]
    Timeout { service: &'static str },

    #[error("{message}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
        message: String,
    },

    #[error("{message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{0}")]
    NotFound(String),
}

impl ExternalFailure {
    /// Replaces the user-facing text of a status/transport failure with a
    /// command-specific apology. Timeouts and not-found keep their text.
    pub fn apologize(self, apology: &str) -> Failure {
        let failure = match self {
            ExternalFailure::Status {
                service,
                status,
                body,
                ..
            } => ExternalFailure::Status {
                service,
                status,
                body,
                message: apology.to_string(),
            },
            ExternalFailure::Transport { service, .. } => ExternalFailure::Transport {
                service,
                message: apology.to_string(),
            },
            other => other,
        };
        Failure::ExternalApi(failure)
    }
}
