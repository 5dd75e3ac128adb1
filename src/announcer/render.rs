use chrono::{DateTime, Utc, Weekday};

use super::AnnouncerConfig;
use crate::gateway::Embed;

const DESCRIPTION: &str =
    "This is an auto-updating daily routine. Click on the names to join the meeting!";

pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Everything besides the routine itself that goes into the embed.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub colour: u32,
    pub weekday: Weekday,
    pub now: DateTime<Utc>,
    pub guild_name: Option<String>,
    pub guild_icon: Option<String>,
    pub creator_name: Option<String>,
    pub creator_avatar: Option<String>,
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn routine_embed(config: &AnnouncerConfig, ctx: &RenderContext) -> Embed {
    let mut embed = Embed::new()
        .title(format!("Class Routine [{}]", weekday_name(ctx.weekday)))
        .colour(ctx.colour)
        .timestamp(ctx.now);

    if let Some(name) = &ctx.guild_name {
        embed = embed.author(name, ctx.guild_icon.clone());
    }
    if let Some(creator) = &ctx.creator_name {
        embed = embed.footer(
            format!("Made with \u{2764} by {} | updated", creator),
            ctx.creator_avatar.clone(),
        );
    }

    let periods = config
        .routine
        .get(ctx.weekday.num_days_from_monday() as usize)
        .filter(|periods| !periods.is_empty());

    let Some(periods) = periods else {
        return embed.description("No classes today.");
    };

    embed = embed.description(DESCRIPTION);
    for (index, period) in periods.iter().enumerate() {
        let value = match config.links.get(period) {
            Some(link) => format!("[{}]({})", period, link),
            None => period.clone(),
        };
        embed = embed.field(format!("{} Period", ordinal(index + 1)), value, true);
    }
    embed
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_ordinal() {
        let cases = [
            (1, "1st"),
            (2, "2nd"),
            (3, "3rd"),
            (4, "4th"),
            (11, "11th"),
            (12, "12th"),
            (13, "13th"),
            (21, "21st"),
            (102, "102nd"),
            (111, "111th"),
        ];
        for (n, expected) in cases {
            assert_eq!(ordinal(n), expected);
        }
    }

    fn ctx(weekday: Weekday) -> RenderContext {
        RenderContext {
            colour: 0x04f2a6,
            weekday,
            now: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            guild_name: Some("Class 10".into()),
            guild_icon: None,
            creator_name: Some("ninja".into()),
            creator_avatar: None,
        }
    }

    fn config() -> AnnouncerConfig {
        let mut links = BTreeMap::new();
        links.insert("Math".to_string(), "https://meet.example/math".to_string());
        AnnouncerConfig {
            routine: vec![
                vec!["Math".into(), "Physics".into()],
                vec!["Chemistry".into()],
            ],
            links,
            ..Default::default()
        }
    }

    #[test]
    fn test_periods_link_known_names() {
        let embed = routine_embed(&config(), &ctx(Weekday::Mon));
        assert_eq!(embed.title.as_deref(), Some("Class Routine [Monday]"));
        assert_eq!(
            embed.field_value("1st Period"),
            Some("[Math](https://meet.example/math)")
        );
        assert_eq!(embed.field_value("2nd Period"), Some("Physics"));
        assert_eq!(
            embed.footer.unwrap().text,
            "Made with \u{2764} by ninja | updated"
        );
        assert_eq!(embed.author.unwrap().name, "Class 10");
    }

    #[test]
    fn test_day_without_periods() {
        let embed = routine_embed(&config(), &ctx(Weekday::Sun));
        assert_eq!(embed.title.as_deref(), Some("Class Routine [Sunday]"));
        assert_eq!(embed.description.as_deref(), Some("No classes today."));
        assert!(embed.fields.is_empty());
    }
}
