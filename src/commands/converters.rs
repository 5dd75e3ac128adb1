//! Turning raw argument text into platform entities.

use crate::error::{CommandResult, Failure};
use crate::framework::args::{parse_role_mention, parse_user_mention};
use crate::framework::Invocation;
use crate::gateway::{GatewayError, MemberProfile, RoleProfile, UserProfile};

/// A user, plus their membership when they belong to the current guild.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub user: UserProfile,
    pub member: Option<MemberProfile>,
}

impl ResolvedUser {
    pub fn display_name(&self) -> &str {
        match &self.member {
            Some(member) => member.display_name(),
            None => &self.user.name,
        }
    }

    pub fn colour(&self) -> u32 {
        self.member
            .as_ref()
            .and_then(MemberProfile::colour)
            .unwrap_or_default()
    }
}

/// Members of the current guild by mention, id or name; other users by id.
pub async fn member_or_user(inv: &Invocation, raw: &str) -> CommandResult<ResolvedUser> {
    let gateway = inv.gateway();

    if let Some(id) = parse_user_mention(raw) {
        if let Some(guild) = inv.guild_id() {
            if let Some(member) = gateway.member(guild, id).await? {
                return Ok(ResolvedUser {
                    user: member.user.clone(),
                    member: Some(member),
                });
            }
        }
        return match gateway.user(id).await {
            Ok(user) => Ok(ResolvedUser { user, member: None }),
            Err(GatewayError::NotFound(_)) => Err(Failure::bad_argument("This user doesn't exist.")),
            Err(e) => Err(e.into()),
        };
    }

    let member = match inv.guild_id() {
        Some(guild) => gateway.search_member(guild, raw).await?,
        None => None,
    };
    match member {
        Some(member) => Ok(ResolvedUser {
            user: member.user.clone(),
            member: Some(member),
        }),
        None => Err(Failure::bad_argument("No member by this name, here.")),
    }
}

/// The invoking author, with membership when in a guild.
pub async fn author(inv: &Invocation) -> CommandResult<ResolvedUser> {
    let member = match inv.guild_id() {
        Some(guild) => inv.gateway().member(guild, inv.author_id()).await?,
        None => None,
    };
    let user = match &member {
        Some(member) => member.user.clone(),
        None => inv.gateway().user(inv.author_id()).await?,
    };
    Ok(ResolvedUser { user, member })
}

/// The author's role colour, falling back to the bot colour.
pub async fn author_colour(inv: &Invocation) -> u32 {
    let member = match inv.guild_id() {
        Some(guild) => inv.gateway().member(guild, inv.author_id()).await.ok().flatten(),
        None => None,
    };
    member
        .as_ref()
        .and_then(MemberProfile::colour)
        .unwrap_or_else(|| inv.colour())
}

/// Only members of the current guild are accepted.
pub async fn member(inv: &Invocation, raw: &str) -> CommandResult<MemberProfile> {
    let guild = inv.require_guild()?;
    let gateway = inv.gateway();
    let found = match parse_user_mention(raw) {
        Some(id) => gateway.member(guild, id).await?,
        None => gateway.search_member(guild, raw).await?,
    };
    found.ok_or_else(|| Failure::bad_argument(format!("Member \"{}\" not found.", raw)))
}

/// Finds a role by mention, id or case-insensitive name.
pub fn find_role<'a>(roles: &'a [RoleProfile], raw: &str) -> CommandResult<&'a RoleProfile> {
    let by_id = parse_role_mention(raw).and_then(|id| roles.iter().find(|r| r.id == id));
    by_id
        .or_else(|| roles.iter().find(|r| r.name.eq_ignore_ascii_case(raw.trim())))
        .ok_or_else(|| Failure::bad_argument(format!("Role \"{}\" not found.", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::role;

    #[test]
    fn test_find_role() {
        let roles = vec![role(10, "Admin", 0xff0000, 2), role(11, "Member", 0, 1)];
        assert_eq!(find_role(&roles, "<@&11>").unwrap().name, "Member");
        assert_eq!(find_role(&roles, "admin").unwrap().name, "Admin");
        assert_eq!(
            find_role(&roles, "Mods").unwrap_err().to_string(),
            "Role \"Mods\" not found."
        );
    }
}
