use rand::seq::SliceRandom;
use rand::Rng;

use super::converters::author_colour;
use super::{join_within, requested_by, FeatureModule};
use crate::config::{Config, DISCORD_FIELD_LIMIT};
use crate::error::{CommandResult, Failure};
use crate::framework::{async_handler, ArgSpec, Args, Category, Command, Handler, Invocation};
use crate::gateway::{Author, Embed, Reply};
use crate::services::apis::{subreddit_name, RedditPost};

const REDDIT_ICON: &str = "https://i.redd.it/rq36kl1xjxr01.png";
const REDDIT_COLOUR: u32 = 0xe74c3c;

pub fn module(_config: &Config) -> FeatureModule {
    FeatureModule::new(
        "fun",
        Category::new("Fun", "Fun commands."),
        vec![
            Command::new("choose")
                .help(
                    "Randomly chooses a result from the provided choices.\n\n\
                     In case of multiworded choices use quotes. E.g - choose \"very good\" bad.",
                )
                .args([ArgSpec::variadic("choices")])
                .handler(Handler::Sync(choose)),
            Command::new("randomnumber")
                .aliases(&["randint"])
                .help("Picks a random number between the provided numbers")
                .args([ArgSpec::required("start"), ArgSpec::required("end")])
                .handler(Handler::Sync(randomnumber)),
            Command::new("cats")
                .aliases(&["cat", "neko"])
                .help("Get a random cat pic. =^-^=")
                .handler(async_handler!(cats)),
            Command::new("reddit")
                .help("Get 5 hot reddit posts from a subreddit.")
                .args([ArgSpec::required("subreddit")])
                .handler(async_handler!(reddit)),
            Command::new("coffee")
                .help("Get a random coffee pic.")
                .handler(async_handler!(coffee)),
            Command::new("facts")
                .help("Get a random fact.")
                .handler(async_handler!(facts)),
            Command::new("asciify")
                .help("Turns text into ASCII art.")
                .args([ArgSpec::rest_required("text")])
                .handler(async_handler!(asciify)),
            Command::new("quote")
                .help("Get a random quote.")
                .handler(async_handler!(quote)),
        ],
    )
}

fn choose(_inv: &Invocation, args: &Args) -> CommandResult<Reply> {
    let choices = args.all("choices");
    match choices.choose(&mut rand::thread_rng()) {
        Some(choice) => Ok(Reply::text(choice.clone())),
        None => Ok(Reply::text("No choices provided.")),
    }
}

fn randomnumber(_inv: &Invocation, args: &Args) -> CommandResult<Reply> {
    let start = args.parse_as::<i64>("start")?.unwrap_or_default();
    let end = args.parse_as::<i64>("end")?.unwrap_or_default();
    let (low, high) = if start > end { (end, start) } else { (start, end) };
    let picked = rand::thread_rng().gen_range(low..=high);
    Ok(Reply::text(picked.to_string()))
}

async fn cats(inv: &Invocation, _args: &Args) -> CommandResult {
    let url = inv
        .data
        .apis
        .random_cat()
        .await
        .map_err(|e| e.apologize("The cat escaped."))?;
    let embed = Embed::new()
        .title("Look a lovely cat!")
        .colour(author_colour(inv).await)
        .image(url);
    inv.send(Reply::embed(requested_by(embed, inv.author())))
        .await?;
    Ok(())
}

/// Splits posts into a `Sticky` and a `Posts` field, skipping empty ones.
pub fn reddit_embed(subreddit: &str, posts: &[RedditPost], requester: &Author) -> Embed {
    let url = format!("https://www.reddit.com/r/{}/hot.json", subreddit_name(subreddit));
    let line = |post: &RedditPost| match &post.flair {
        Some(flair) => format!("[{}]({}) [{}]", post.title, post.url, flair),
        None => format!("[{}]({})", post.title, post.url),
    };
    let (sticky, normal): (Vec<&RedditPost>, Vec<&RedditPost>) =
        posts.iter().partition(|post| post.stickied);

    let mut embed = Embed::new()
        .colour(REDDIT_COLOUR)
        .author(subreddit, Some(REDDIT_ICON.to_string()))
        .url(url);
    for (name, group) in [("Sticky", sticky), ("Posts", normal)] {
        if group.is_empty() {
            continue;
        }
        let lines: Vec<String> = group.into_iter().map(line).collect();
        embed = embed.field(name, join_within(&lines, DISCORD_FIELD_LIMIT), false);
    }
    requested_by(embed, requester)
}

async fn reddit(inv: &Invocation, args: &Args) -> CommandResult {
    let subreddit = args.require("subreddit")?;
    let posts = inv
        .data
        .apis
        .reddit_hot(subreddit)
        .await
        .map_err(|e| e.apologize("Sorry, couldn't get the subreddit posts."))?;
    inv.send(Reply::embed(reddit_embed(subreddit, &posts, inv.author())))
        .await?;
    Ok(())
}

async fn coffee(inv: &Invocation, _args: &Args) -> CommandResult {
    let url = inv
        .data
        .apis
        .random_coffee()
        .await
        .map_err(|e| e.apologize("No Coffee today."))?;
    let embed = Embed::new()
        .title("A coffee for you!")
        .colour(author_colour(inv).await)
        .image(url);
    inv.send(Reply::embed(requested_by(embed, inv.author())))
        .await?;
    Ok(())
}

async fn facts(inv: &Invocation, _args: &Args) -> CommandResult {
    let fact = inv
        .data
        .apis
        .random_fact()
        .await
        .map_err(|e| e.apologize("No facts today."))?;
    let embed = Embed::new()
        .title("Facts")
        .description(fact)
        .colour(author_colour(inv).await);
    inv.send(Reply::embed(requested_by(embed, inv.author())))
        .await?;
    Ok(())
}

async fn asciify(inv: &Invocation, args: &Args) -> CommandResult {
    let art = inv
        .data
        .apis
        .asciify(args.require("text")?)
        .await
        .map_err(|e| e.apologize("Sorry, couldn't get the ASCII."))?;
    if art.chars().count() + 6 > crate::config::DISCORD_MESSAGE_LIMIT {
        return Err(Failure::bad_argument("That's too long to asciify."));
    }
    inv.say(format!("```{}```", art)).await?;
    Ok(())
}

async fn quote(inv: &Invocation, _args: &Args) -> CommandResult {
    let quote = inv
        .data
        .apis
        .random_quote()
        .await
        .map_err(|e| e.apologize("Sorry, couldn't get any quotes."))?;
    let author = match quote.author.trim() {
        "" => "unknown",
        name => name,
    };

    let mut embed = Embed::new()
        .title("Random Quote")
        .description(quote.text.trim())
        .colour(author_colour(inv).await)
        .footer(
            format!("\u{30fc} {} | Requested by {}", author, inv.author().name),
            None,
        );
    if !quote.link.is_empty() {
        embed = embed.url(quote.link);
    }
    inv.send(Reply::embed(embed)).await?;
    Ok(())
}
