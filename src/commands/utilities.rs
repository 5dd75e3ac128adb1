use super::{requested_by, FeatureModule};
use crate::config::{Config, DISCORD_FIELD_LIMIT};
use crate::error::{CommandResult, Failure};
use crate::framework::{async_handler, ArgSpec, Args, Category, Command, Invocation};
use crate::gateway::{Author, Embed, Reply};
use crate::services::apis::{
    language_code, language_name, shorten, MathOperation, Translation, WikiLookup,
};

const WIKI_ICON: &str =
    "https://upload.wikimedia.org/wikipedia/commons/6/6e/Wikipedia_logo_silver.png";
const WIKI_COLOUR: u32 = 0xF9F0F0;
const TRANSLATE_ICON: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/d/d7/\
                              Google_Translate_logo.svg/1200px-Google_Translate_logo.svg.png";
const TRANSLATE_COLOUR: u32 = 0x3498db;
const MATH_COLOUR: u32 = 0x7289da;

pub fn module(_config: &Config) -> FeatureModule {
    let math = |op: MathOperation, help: &str| {
        Command::new(op.as_str())
            .help(help)
            .args([ArgSpec::rest_required("expression")])
    };

    FeatureModule::new(
        "utilities",
        Category::new("Utilities", "Useful commands."),
        vec![
            Command::new("wikipedia")
                .aliases(&["wiki"])
                .help("Get a summary of a wikipedia page.")
                .args([ArgSpec::rest_required("topic")])
                .handler(async_handler!(wikipedia)),
            Command::new("translate")
                .aliases(&["tl"])
                .help("Translate text to english.")
                .args([ArgSpec::rest_required("text")])
                .handler(async_handler!(translate)),
            Command::new("translateto")
                .aliases(&["tlto", "tl2"])
                .help(
                    "Translate text to the given language.\n\n\
                     The destination can be a language code or its english name.",
                )
                .args([ArgSpec::required("destination"), ArgSpec::rest_required("text")])
                .handler(async_handler!(translate_to)),
            Command::new("math")
                .help("Math related commands.")
                .subcommand(
                    math(MathOperation::Factor, "Factorize an expression.")
                        .handler(async_handler!(factor)),
                )
                .subcommand(
                    math(MathOperation::Derive, "Differentiate an expression.")
                        .handler(async_handler!(derive)),
                )
                .subcommand(
                    math(MathOperation::Integrate, "Integrate an expression.")
                        .handler(async_handler!(integrate)),
                )
                .subcommand(
                    math(MathOperation::Zeroes, "Find the zeroes of an expression.")
                        .handler(async_handler!(zeroes)),
                ),
        ],
    )
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn wiki_embed(lookup: WikiLookup, requester: &Author) -> Embed {
    let embed = Embed::new()
        .colour(WIKI_COLOUR)
        .author("wikipedia", Some(WIKI_ICON.to_string()));
    let embed = match lookup {
        WikiLookup::Disambiguation(options) => embed
            .title("Disambiguation")
            .description(options.join("\n")),
        WikiLookup::Page(page) => {
            let placeholder = format!("... [Continue]({})", page.url);
            let mut embed = embed
                .title(page.title)
                .url(page.url.clone())
                .field(
                    "Summary",
                    shorten(&page.extract, DISCORD_FIELD_LIMIT, &placeholder),
                    false,
                );
            if let Some(thumbnail) = page.thumbnail {
                embed = embed.thumbnail(thumbnail);
            }
            embed
        }
    };
    requested_by(embed, requester)
}

async fn wikipedia(inv: &Invocation, args: &Args) -> CommandResult {
    let lookup = inv
        .data
        .apis
        .wikipedia(args.require("topic")?)
        .await
        .map_err(|e| e.apologize("Sorry, couldn't reach wikipedia."))?;
    inv.send(Reply::embed(wiki_embed(lookup, inv.author())))
        .await?;
    Ok(())
}

pub fn translation_embed(translation: &Translation, dest: &str, requester: &Author) -> Embed {
    let source = language_name(&translation.source_language)
        .map(title_case)
        .unwrap_or_else(|| "Auto-Detected".to_string());
    let target = language_name(dest).map(title_case).unwrap_or_else(|| dest.to_string());

    let embed = Embed::new()
        .colour(TRANSLATE_COLOUR)
        .author("Translator", Some(TRANSLATE_ICON.to_string()))
        .field(
            format!("From {}", source),
            shorten(&translation.original, DISCORD_FIELD_LIMIT, "..."),
            false,
        )
        .field(
            format!("To {}", target),
            shorten(&translation.text, DISCORD_FIELD_LIMIT, "..."),
            false,
        );
    requested_by(embed, requester)
}

async fn send_translation(inv: &Invocation, text: &str, dest: &str) -> CommandResult {
    let translation = inv
        .data
        .apis
        .translate(text, dest)
        .await
        .map_err(|e| e.apologize("Sorry, couldn't translate that."))?;
    let embed = translation_embed(&translation, dest, inv.author());
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}

async fn translate(inv: &Invocation, args: &Args) -> CommandResult {
    send_translation(inv, args.require("text")?, "en").await
}

async fn translate_to(inv: &Invocation, args: &Args) -> CommandResult {
    let dest = language_code(args.require("destination")?)
        .ok_or_else(|| Failure::bad_argument("Not a valid destination language."))?;
    send_translation(inv, args.require("text")?, dest).await
}

async fn calculate(inv: &Invocation, args: &Args, operation: MathOperation) -> CommandResult {
    let expression = args.require("expression")?;
    let result = inv
        .data
        .apis
        .math(operation, expression)
        .await
        .map_err(|e| e.apologize("Unable to perform calculation."))?;

    let embed = Embed::new()
        .title(format!("{} `{}`", title_case(operation.as_str()), expression))
        .description(format!("```{}```", result))
        .colour(MATH_COLOUR);
    inv.send(Reply::embed(requested_by(embed, inv.author())))
        .await?;
    Ok(())
}

async fn factor(inv: &Invocation, args: &Args) -> CommandResult {
    calculate(inv, args, MathOperation::Factor).await
}

async fn derive(inv: &Invocation, args: &Args) -> CommandResult {
    calculate(inv, args, MathOperation::Derive).await
}

async fn integrate(inv: &Invocation, args: &Args) -> CommandResult {
    calculate(inv, args, MathOperation::Integrate).await
}

async fn zeroes(inv: &Invocation, args: &Args) -> CommandResult {
    calculate(inv, args, MathOperation::Zeroes).await
}
