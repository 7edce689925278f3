use rand::Rng;

/// Substring that marks a line as a bot command (matched case-insensitively).
pub const BOT_MARKER: &str = "BOT.";

/// Prefix of every line the bot writes.
pub const REPLY_PREFIX: &str = "[BOT]: ";

pub const GREETING_REPLY: &str = "Hello there!";

pub const UNRECOGNIZED_REPLY: &str = "That is not a valid bot message. See README.txt for details";

/// The fixed set a "random fact" request draws from.
pub const FACTS: [&str; 5] = [
    "The Eiffel Tower can be 15 cm taller during the summer",
    "Australia is wider than the moon",
    "It's illegal to own just one guinea pig in Switzerland",
    "The Spanish national anthem has no words",
    "The Japanese word 'Kuchi zamishi' is the act of eating when you're not hungry because your mouth is lonely",
];

pub fn is_command(line: &str) -> bool {
    line.to_lowercase().contains(&BOT_MARKER.to_lowercase())
}

/// Reply for `line`, or `None` when the line carries no bot marker.
pub fn respond<R: Rng + ?Sized>(line: &str, rng: &mut R) -> Option<String> {
    if !is_command(line) {
        return None;
    }

    let lowered = line.to_lowercase();
    let body = if lowered.contains("hi") || lowered.contains("hello") {
        GREETING_REPLY
    } else if lowered.contains("random fact") {
        FACTS[rng.random_range(0..FACTS.len())]
    } else {
        UNRECOGNIZED_REPLY
    };

    Some(format!("{}{}", REPLY_PREFIX, body))
}
