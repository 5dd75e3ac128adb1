//! Static preconditions on categories and commands, evaluated against a `Viewer`.

use serenity::all::{GuildId, Permissions, UserId};

use crate::error::Failure;

/// Who is asking. Permissions are only present inside a guild.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user_id: UserId,
    pub guild_id: Option<GuildId>,
    pub is_owner: bool,
    pub permissions: Option<Permissions>,
}

/// A static precondition attached to a category or a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    GuildOnly,
    OwnerOnly,
    /// Only usable inside one specific guild; the message explains why.
    GuildRestricted {
        guild_id: Option<GuildId>,
        message: String,
    },
    Permissions(Permissions),
}

impl Check {
    pub fn needs_permissions(&self) -> bool {
        matches!(self, Check::Permissions(_))
    }

    pub fn evaluate(&self, viewer: &Viewer) -> Result<(), Failure> {
        match self {
            Check::GuildOnly => {
                if viewer.guild_id.is_some() {
                    Ok(())
                } else {
                    Err(Failure::CheckFailed)
                }
            }
            Check::OwnerOnly => {
                if viewer.is_owner {
                    Ok(())
                } else {
                    Err(Failure::CheckFailed)
                }
            }
            Check::GuildRestricted { guild_id, message } => match (guild_id, viewer.guild_id) {
                (Some(required), Some(current)) if *required == current => Ok(()),
                _ => Err(Failure::GuildRestricted(message.clone())),
            },
            Check::Permissions(required) => {
                let Some(granted) = viewer.permissions else {
                    return Err(Failure::CheckFailed);
                };
                let missing = required.difference(granted);
                if granted.administrator() || missing.is_empty() {
                    Ok(())
                } else {
                    Err(Failure::PermissionDenied(missing_names(missing)))
                }
            }
        }
    }
}

/// `"Kick Members and Ban Members"` style listing.
fn missing_names(missing: Permissions) -> String {
    let names = missing.get_permission_names();
    match names.as_slice() {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

pub fn evaluate_all<'a>(
    checks: impl IntoIterator<Item = &'a Check>,
    viewer: &Viewer,
) -> Result<(), Failure> {
    checks.into_iter().try_for_each(|check| check.evaluate(viewer))
}
