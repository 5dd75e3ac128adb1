use chrono::Utc;
use clap::Parser;

use super::{flag_error, flag_tokens, FeatureModule};
use crate::config::Config;
use crate::error::{CommandResult, Failure};
use crate::framework::{async_handler, ArgSpec, Args, Category, Check, Command, Invocation};
use crate::gateway::{Embed, Reply};

const EMBED_ALIASES: &[(&str, &str)] = &[
    ("-si", "--set-image"),
    ("-st", "--set-thumbnail"),
    ("-sf", "--set-footer"),
    ("-af", "--add-field"),
];

pub fn module(_config: &Config) -> FeatureModule {
    FeatureModule::new(
        "manage",
        Category::new("Manage", "Server management related commands.").check(Check::GuildOnly),
        vec![Command::new("makembed")
            .aliases(&["mkembed"])
            .help(
                "Create your own embed.\n\n\
                 Avialable Options:\n\
                 `-t`, `--title` - The title of the embed.\n\
                 `-d`, `--description` - The description of the embed.\n\
                 `-c`, `--colour` - The colour of the embed. Accepts both RGB and hex.\n\
                 `-si`, `--set-image` - Url of the embed's image.\n\
                 `-st`, `--set-thumbnail` - Url of the embed's thumbnail.\n\
                 `-sf`, `--set-footer` - Footer's text and icon's url. Provide empty quote for no icon.\n\
                 `-af`, `--add-field` - Field's name, value and inline state.\n\n\
                 You can also add multiple fields, also make sure to seperate the name and value with quotes.",
            )
            .args([ArgSpec::rest_required("flags")])
            .handler(async_handler!(makembed))],
    )
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
struct EmbedFlags {
    #[arg(short = 't', long)]
    title: Option<String>,
    #[arg(short = 'd', long)]
    description: Option<String>,
    #[arg(short = 'c', long, num_args = 1..)]
    colour: Vec<String>,
    #[arg(long)]
    set_image: Option<String>,
    #[arg(long)]
    set_thumbnail: Option<String>,
    #[arg(long, num_args = 2)]
    set_footer: Vec<String>,
    /// Flattened `name value inline` triples, one per occurrence.
    #[arg(long, num_args = 3, action = clap::ArgAction::Append)]
    add_field: Vec<String>,
}

/// `#rrggbb`, `rrggbb` or three integers `r g b`.
fn parse_colour(values: &[String]) -> CommandResult<u32> {
    let value = match values {
        [hex] => i64::from_str_radix(hex.trim_start_matches('#'), 16)
            .map_err(|_| Failure::bad_argument("Not a valid hex."))?,
        [r, g, b] => {
            let parts = [r, g, b]
                .iter()
                .map(|c| c.parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| Failure::bad_argument("Only integers are allowed in RGB."))?;
            (parts[0] << 16) + (parts[1] << 8) + parts[2]
        }
        _ => return Err(Failure::bad_argument("Not a valid colour.")),
    };
    u32::try_from(value)
        .ok()
        .filter(|v| *v <= 0xFFFFFF)
        .ok_or_else(|| Failure::bad_argument("Not a valid colour."))
}

fn build_embed(flags: EmbedFlags, embed: Embed) -> CommandResult<Embed> {
    let mut embed = embed;
    if let Some(title) = flags.title {
        embed = embed.title(title);
    }
    if let Some(description) = flags.description {
        embed = embed.description(description);
    }
    if !flags.colour.is_empty() {
        embed = embed.colour(parse_colour(&flags.colour)?);
    }
    if let Some(image) = flags.set_image {
        embed = embed.image(image);
    }
    if let Some(thumbnail) = flags.set_thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if let [text, icon] = flags.set_footer.as_slice() {
        let icon = Some(icon.clone()).filter(|i| !i.is_empty());
        embed = embed.footer(text.clone(), icon);
    }
    for field in flags.add_field.chunks(3) {
        if let [name, value, inline] = field {
            embed = embed.field(name.clone(), value.clone(), !inline.eq_ignore_ascii_case("false"));
        }
    }
    Ok(embed)
}

async fn makembed(inv: &Invocation, args: &Args) -> CommandResult {
    let tokens = flag_tokens(args.require("flags")?, EMBED_ALIASES)?;
    let flags = EmbedFlags::try_parse_from(tokens).map_err(flag_error)?;

    let author = inv.author();
    let base = Embed::new()
        .timestamp(Utc::now())
        .author(author.name.clone(), Some(author.avatar_url.clone()));
    let embed = build_embed(flags, base)?;
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}
